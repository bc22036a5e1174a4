use serde::Serialize;

/// Build information embedded at compile time
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_branch: &'static str,
    pub build_timestamp: &'static str,
}

impl BuildInfo {
    /// User agent sent on every outbound SoliDB request.
    pub fn user_agent(&self) -> String {
        format!("solidb-www/{} ({})", self.version, self.git_commit)
    }
}

macro_rules! option_env_or {
    ($name:expr, $default:expr) => {
        match option_env!($name) {
            Some(v) => v,
            None => $default,
        }
    };
}

/// Static build information - populated at compile time via build.rs
pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    git_commit: option_env_or!("SDB_WWW_GIT_COMMIT", "unknown"),
    git_branch: option_env_or!("SDB_WWW_GIT_BRANCH", "unknown"),
    build_timestamp: option_env_or!("SDB_WWW_BUILD_TIMESTAMP", "unknown"),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_version() {
        let ua = BUILD_INFO.user_agent();
        assert!(ua.starts_with("solidb-www/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
    }
}
