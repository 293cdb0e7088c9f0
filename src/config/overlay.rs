use serde::Deserialize;

/// Values read from a YAML configuration file. Keys mirror the long flag names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConfigOverlay {
    pub loglevel: Option<String>,
    pub timeout: Option<u64>,
    pub endpoint: Option<EndpointOverlay>,
    pub npm_endpoint: Option<String>,
    pub pypi_endpoint: Option<String>,
    pub core_endpoint: Option<String>,
    pub gh_token: Option<String>,
    pub jwt_token: Option<String>,
    pub npm_registry: Option<String>,
    pub reporter: Option<StringList>,
    pub gh_owner: Option<String>,
    pub gh_repo: Option<String>,
    pub gh_pull_id: Option<u64>,
    pub ignore_packages: Option<StringList>,
    pub ignore_deptypes: Option<StringList>,
    pub select: Option<String>,
    pub json: Option<bool>,
    pub jq: Option<String>,
    pub lockfiles: Option<StringList>,
    pub genlock: Option<bool>,
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EndpointOverlay {
    pub npm: Option<String>,
    pub pypi: Option<String>,
    pub core: Option<String>,
}

/// A list written either as a YAML sequence or as a comma separated string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    Many(Vec<String>),
    One(String),
}

impl StringList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::Many(values) => values
                .into_iter()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect(),
            Self::One(value) => super::split_list(&value),
        }
    }
}

impl ConfigOverlay {
    pub fn npm_endpoint(&self) -> Option<String> {
        self.npm_endpoint
            .clone()
            .or_else(|| self.endpoint.as_ref().and_then(|e| e.npm.clone()))
    }

    pub fn pypi_endpoint(&self) -> Option<String> {
        self.pypi_endpoint
            .clone()
            .or_else(|| self.endpoint.as_ref().and_then(|e| e.pypi.clone()))
    }

    pub fn core_endpoint(&self) -> Option<String> {
        self.core_endpoint
            .clone()
            .or_else(|| self.endpoint.as_ref().and_then(|e| e.core.clone()))
    }
}
