use std::path::{Path, PathBuf};

/// Whether `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Looks `name` up in the directories listed by `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|directory| directory.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn only_files_with_an_exec_bit_are_executable() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("lstn-core-exec-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create dir");

        let script = dir.join("tool");
        std::fs::write(&script, "#!/bin/sh\n").expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644))
            .expect("chmod 644");
        assert!(!is_executable(&script));

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod 755");
        assert!(is_executable(&script));
        assert!(!is_executable(&dir));

        let _ = std::fs::remove_dir_all(dir);
    }
}
