use serde::Serialize;

/// Best-effort description of the host operating system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub arch: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kernel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kernel_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
}

impl OsInfo {
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            kernel: read_kernel_value("ostype"),
            kernel_version: read_kernel_value("osrelease"),
            hostname: detect_hostname(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// `os/arch (hostname) kernel/version`, skipping whatever is unknown.
    pub fn format_as_user_agent(&self) -> String {
        let mut formatted = String::new();
        if !self.os.is_empty() {
            formatted.push_str(&self.os);
            if !self.arch.is_empty() {
                formatted.push('/');
                formatted.push_str(&self.arch);
            }
            if !self.hostname.is_empty() {
                formatted.push_str(&format!(" ({})", self.hostname));
            }
        }
        if !self.kernel.is_empty() {
            if !formatted.is_empty() {
                formatted.push(' ');
            }
            formatted.push_str(&self.kernel);
            if !self.kernel_version.is_empty() {
                formatted.push('/');
                formatted.push_str(&self.kernel_version);
            }
        }
        formatted
    }
}

fn read_kernel_value(name: &str) -> String {
    if !cfg!(target_os = "linux") {
        return String::new();
    }
    std::fs::read_to_string(format!("/proc/sys/kernel/{name}"))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn detect_hostname() -> String {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(value) = std::env::var(var)
            && !value.trim().is_empty()
        {
            return value.trim().to_string();
        }
    }
    read_kernel_value("hostname")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_every_known_part() {
        let info = OsInfo {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            kernel: "Linux".to_string(),
            kernel_version: "6.1.0".to_string(),
            hostname: "runner".to_string(),
        };
        assert_eq!(
            info.format_as_user_agent(),
            "linux/x86_64 (runner) Linux/6.1.0"
        );
    }

    #[test]
    fn skips_unknown_parts() {
        let info = OsInfo {
            os: "darwin".to_string(),
            ..OsInfo::default()
        };
        assert_eq!(info.format_as_user_agent(), "darwin");
        assert_eq!(OsInfo::default().format_as_user_agent(), "");
    }

    #[test]
    fn detect_always_knows_os_and_arch() {
        let info = OsInfo::detect();
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.arch, std::env::consts::ARCH);
    }
}
