use lstn_http::ToolVersion;

const RELEASES_URL: &str = "https://github.com/listendev/lstn/releases/tag";

/// `lstn version`: the release tag by default, `-v` the short version, `-vv` the long one.
pub fn render(version: &ToolVersion, verbosity: u8, changelog: bool) -> String {
    let shown = match verbosity {
        0 => version.tag(),
        1 => version.short.clone(),
        _ => version.long.clone(),
    };
    let mut out = format!("lstn {shown}");
    if changelog {
        out.push('\n');
        out.push_str(&format!("{RELEASES_URL}/{}", version.tag()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version() -> ToolVersion {
        ToolVersion {
            short: "0.2.0".to_string(),
            long: "0.2.0-abc1234".to_string(),
        }
    }

    #[test]
    fn verbosity_selects_the_spelling() {
        assert_eq!(render(&version(), 0, false), "lstn v0.2.0");
        assert_eq!(render(&version(), 1, false), "lstn 0.2.0");
        assert_eq!(render(&version(), 2, false), "lstn 0.2.0-abc1234");
        assert_eq!(render(&version(), 5, false), "lstn 0.2.0-abc1234");
    }

    #[test]
    fn changelog_links_the_release() {
        assert_eq!(
            render(&version(), 1, true),
            "lstn 0.2.0\nhttps://github.com/listendev/lstn/releases/tag/v0.2.0"
        );
    }
}
