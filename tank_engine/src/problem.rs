use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    compare::CompareMode,
    config::LimitConfig,
    error::{Error, Result},
    test::Test,
    testcase::Testcase,
    vfs::{DirFs, JudgeFs, TarFs, ZipFs},
    Limit,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaseConfig {
    #[serde(rename = "inputFile")]
    pub inputfile_path: String,
    #[serde(rename = "answerFile")]
    pub answerfile_path: String,
    #[serde(rename = "spjSource", default)]
    pub spj_source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum JudgeModeConfig {
    Normal {
        #[serde(rename = "comparisionMode")]
        comparision_mode: CompareMode,
    },
    /// Each case carries a verifier that is built with the candidate's
    /// source staged as `header`.
    Special {
        header: String,
        #[serde(rename = "comparisionMode", default)]
        comparision_mode: CompareMode,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProblemConfig {
    pub name: String,
    #[serde(skip_serializing, skip_deserializing)]
    path: PathBuf,
    #[serde(rename = "limitConfig")]
    pub limit_config: LimitConfig,
    #[serde(rename = "judgeMode")]
    pub judge_mode: JudgeModeConfig,
    /// Case files live in this archive instead of next to the problem file.
    #[serde(default)]
    pub archive: Option<String>,
    pub cases: Vec<CaseConfig>,
}

impl ProblemConfig {
    pub fn from_string(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Loads a problem; relative paths resolve against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut v = Self::from_string(&content)?;

        let r_path = path.canonicalize()?;
        v.path = r_path
            .parent()
            .ok_or_else(|| Error::NotFound(path.display().to_string()))?
            .to_path_buf();

        v.check_valid()?;
        Ok(v)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_spj(&self) -> bool {
        matches!(self.judge_mode, JudgeModeConfig::Special { .. })
    }

    pub fn limit(&self) -> Limit {
        (&self.limit_config).into()
    }

    /// Filesystem the case files are read from.
    pub fn data_fs(&self) -> Result<Arc<dyn JudgeFs>> {
        match &self.archive {
            Some(archive) if archive.ends_with(".zip") => {
                Ok(Arc::new(ZipFs::open_archive(self.path.join(archive))?))
            }
            Some(archive) => Ok(Arc::new(TarFs::open_archive(self.path.join(archive))?)),
            None => Ok(Arc::new(DirFs::new(&self.path)?)),
        }
    }

    pub fn check_valid(&self) -> Result<()> {
        let data = self.data_fs()?;
        for case in self.cases.iter() {
            data.open(&case.inputfile_path)?;
            data.open(&case.answerfile_path)?;
            match (&self.judge_mode, &case.spj_source) {
                (JudgeModeConfig::Special { .. }, Some(spj)) => {
                    data.open(spj)?;
                }
                (JudgeModeConfig::Special { .. }, None) => {
                    return Err(Error::Argument(format!(
                        "case `{}` needs a spjSource in special judge mode",
                        case.inputfile_path
                    )))
                }
                (JudgeModeConfig::Normal { .. }, Some(_)) => {
                    return Err(Error::Argument(format!(
                        "case `{}` has a spjSource but the problem is not special judged",
                        case.inputfile_path
                    )))
                }
                (JudgeModeConfig::Normal { .. }, None) => {}
            }
        }
        Ok(())
    }

    /// Builds one testcase per configured case, in file order.
    pub fn testcases(&self) -> Result<Vec<Testcase>> {
        let data = self.data_fs()?;
        let limit = self.limit();
        self.cases
            .iter()
            .map(|case| -> Result<Testcase> {
                let testcase = match &self.judge_mode {
                    JudgeModeConfig::Normal { comparision_mode } => Testcase::new(
                        Arc::clone(&data),
                        case.inputfile_path.as_str(),
                        case.answerfile_path.as_str(),
                        limit,
                    )
                    .with_compare_mode(*comparision_mode),
                    JudgeModeConfig::Special {
                        header,
                        comparision_mode,
                    } => {
                        let spj = case.spj_source.as_ref().ok_or_else(|| {
                            Error::Argument(format!(
                                "case `{}` has no spjSource",
                                case.inputfile_path
                            ))
                        })?;
                        Testcase::new_spj(
                            Arc::clone(&data),
                            case.inputfile_path.as_str(),
                            case.answerfile_path.as_str(),
                            spj.as_str(),
                            header.as_str(),
                            limit,
                        )
                        .with_compare_mode(*comparision_mode)
                    }
                };
                Ok(testcase)
            })
            .collect()
    }

    /// Queues every case on `test`.
    pub fn queue(&self, test: &mut Test) -> Result<usize> {
        let testcases = self.testcases()?;
        let count = testcases.len();
        for testcase in testcases {
            test.add(testcase)?;
        }
        info!("queued {} case(s) of `{}`", count, self.name);
        Ok(count)
    }
}
