use std::{
    env, fs,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("{0} environment variable is not set")]
    EnvMissing(&'static str),
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(target_os = "windows")]
const USER_HOME_VARS: &[&str] = &["USERPROFILE", "HOME"];
#[cfg(not(target_os = "windows"))]
const USER_HOME_VARS: &[&str] = &["HOME"];

/// Base directory for the default home: `%APPDATA%` on Windows, `$HOME` elsewhere.
#[cfg(target_os = "windows")]
const DEFAULT_BASE_VAR: &str = "APPDATA";
#[cfg(not(target_os = "windows"))]
const DEFAULT_BASE_VAR: &str = "HOME";

fn user_home() -> Option<PathBuf> {
    USER_HOME_VARS
        .iter()
        .find_map(|var| env::var_os(var))
        .map(PathBuf::from)
}

/// Expand a leading `~` against `home` and require an absolute result.
fn expand(raw: &str, home: Option<PathBuf>) -> Result<PathBuf, HomeDirError> {
    let expanded = match raw.strip_prefix('~') {
        Some(rest) => {
            let home = home.ok_or(HomeDirError::EnvMissing(USER_HOME_VARS[0]))?;
            let rest = rest.trim_start_matches(['/', '\\']);
            if rest.is_empty() {
                home
            } else {
                home.join(rest)
            }
        }
        None => PathBuf::from(raw),
    };
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Err(HomeDirError::AbsoluteRequired(
            expanded.to_string_lossy().into_owned(),
        ))
    }
}

/// Resolve the application home directory.
///
/// A configured path may start with `~`; it must be absolute once expanded.
/// Without one, `<base>/<default_subdir>` is used where `<base>` is
/// `%APPDATA%` on Windows and `$HOME` elsewhere. With `create` the directory
/// is created when missing.
pub fn resolve_home_dir(
    config_home: Option<&str>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match config_home.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => expand(raw, user_home())?,
        None => {
            let base =
                env::var_os(DEFAULT_BASE_VAR).ok_or(HomeDirError::EnvMissing(DEFAULT_BASE_VAR))?;
            Path::new(&base).join(default_subdir)
        }
    };

    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tilde_expands_against_home() {
        let home = tempdir().unwrap();
        let out = expand("~/partkit", Some(home.path().to_path_buf())).unwrap();
        assert_eq!(out, home.path().join("partkit"));

        let bare = expand("~", Some(home.path().to_path_buf())).unwrap();
        assert_eq!(bare, home.path());
    }

    #[test]
    fn tilde_without_home_fails() {
        assert!(matches!(
            expand("~/x", None),
            Err(HomeDirError::EnvMissing(_))
        ));
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = expand("relative/path", None).unwrap_err();
        assert!(matches!(err, HomeDirError::AbsoluteRequired(ref p) if p.contains("relative")));
    }

    #[test]
    fn configured_directory_is_created() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("nested").join("home");
        let raw = target.to_string_lossy().into_owned();

        let out = resolve_home_dir(Some(&raw), ".partkit", true).unwrap();
        assert_eq!(out, target);
        assert!(target.is_dir());
    }

    #[test]
    fn blank_config_falls_back_to_default_subdir() {
        if env::var_os(DEFAULT_BASE_VAR).is_none() {
            return;
        }
        let out = resolve_home_dir(Some("  "), ".partkit", false).unwrap();
        assert!(out.ends_with(".partkit"));
    }
}
