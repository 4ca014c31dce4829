use crate::error::ModsyncError;

use std::fs;
use std::ops::Deref;
use std::path::Path;
use std::path::PathBuf;
use tracing::{debug, error};

/// Directory that is removed along with everything in it when dropped
pub struct TempDir {
    pub path: PathBuf,
}

impl TempDir {
    /// Creates the directory, canonicalizing the path so it can be handed to the browser
    ///
    /// # Errors
    /// * `UnsafeTempDir` if the directory already exists and isn't empty, since it gets deleted on drop
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ModsyncError> {
        let path = path.as_ref();
        if path.try_exists()? && fs::read_dir(path)?.next().is_some() {
            return Err(ModsyncError::UnsafeTempDir(
                path.to_path_buf(),
                "it already exists and isn't empty".into(),
            ));
        }

        fs::create_dir_all(path)?;
        Ok(TempDir {
            path: path.canonicalize()?,
        })
    }
}

/// Absolute form of `path` with symlinks and `..` resolved as far as the path exists
fn resolve(path: &Path) -> Result<PathBuf, ModsyncError> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = path.as_path();
    let mut rest = vec![];
    while !existing.try_exists()? {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_owned());
                existing = parent;
            }
            _ => return Ok(path),
        }
    }

    Ok(rest
        .into_iter()
        .rev()
        .fold(existing.canonicalize()?, |acc, next| acc.join(next)))
}

/// Make sure removing `temp` can't take anything in `keep` with it
///
/// # Errors
/// * `UnsafeTempDir` if `temp` is, or is a parent of, any path in `keep`
pub fn check_temp_dir(
    temp: impl AsRef<Path>,
    keep: &[&Path],
) -> Result<(), ModsyncError> {
    let temp = temp.as_ref();
    let resolved = resolve(temp)?;
    for path in keep {
        if resolve(path)?.starts_with(&resolved) {
            return Err(ModsyncError::UnsafeTempDir(
                temp.to_path_buf(),
                format!("removing it would delete {}", path.display()),
            ));
        }
    }
    Ok(())
}

impl Deref for TempDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        debug!("Removing temp directory {}", self.path.display());
        if let Err(e) = fs::remove_dir_all(&self.path) {
            error!(
                "Error removing temp directory at '{}': {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Create `path` and any missing parents
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<(), ModsyncError> {
    let path = path.as_ref();
    if !path.try_exists()? {
        debug!("Creating directory {}", path.display());
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Read the names of the mods to process, one per line
///
/// Blank lines and `--` comments are skipped
///
/// # Errors
/// * `MissingFile` if there is no file at `path`
pub fn read_mod_list(path: impl AsRef<Path>) -> Result<Vec<String>, ModsyncError> {
    let path = path.as_ref();
    if !path.try_exists()? {
        return Err(ModsyncError::MissingFile(path.to_path_buf()));
    }

    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("--"))
        .map(String::from)
        .collect())
}

#[cfg(feature = "steam")]
pub(crate) mod steam {
    use std::path::PathBuf;
    use steamlocate::SteamDir;

    const DARKTIDE_APP_ID: u32 = 1361210;

    pub fn darktide() -> Option<PathBuf> {
        let mut steamdir = SteamDir::locate()?;
        Some(steamdir.app(&DARKTIDE_APP_ID)?.path.clone())
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::{check_temp_dir, ensure_dir, read_mod_list, TempDir};
    use crate::error::ModsyncError;

    #[test]
    fn mod_list_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod_load_order.txt");
        fs::write(
            &path,
            "-- File generated by the mod manager\nChatBlock\n\n  true_level  \r\nSpidey Sense\n   \n",
        )
        .unwrap();

        let mods = read_mod_list(&path).unwrap();
        assert_eq!(mods, vec!["ChatBlock", "true_level", "Spidey Sense"]);
    }

    #[test]
    fn missing_mod_list() {
        let dir = tempfile::tempdir().unwrap();
        let res = read_mod_list(dir.path().join("missing.txt"));
        assert!(matches!(res, Err(ModsyncError::MissingFile(_))));
    }

    #[test]
    fn temp_dir_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp");
        {
            let temp = TempDir::create(&path).unwrap();
            fs::write(temp.join("partial.zip"), b"data").unwrap();
            assert!(temp.is_absolute());
        }
        assert!(!path.exists());
    }

    #[test]
    fn temp_dir_refuses_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(mods.join("ChatBlock")).unwrap();
        fs::write(mods.join("ChatBlock/ChatBlock.mod"), "return {}").unwrap();

        let res = TempDir::create(&mods);
        assert!(matches!(res, Err(ModsyncError::UnsafeTempDir(..))));
        drop(res);
        assert!(mods.join("ChatBlock/ChatBlock.mod").is_file());
    }

    #[test]
    fn temp_dir_reuses_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp");
        fs::create_dir(&path).unwrap();
        let temp = TempDir::create(&path).unwrap();
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn temp_dir_must_not_hold_kept_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mods = dir.path().join("game").join("mods");
        fs::create_dir_all(&mods).unwrap();
        let versions = dir.path().join("mod_versions.json");
        let cookies = dir.path().join("state").join("cookies.json");
        let keep = [mods.as_path(), versions.as_path(), cookies.as_path()];

        assert!(check_temp_dir(dir.path().join("temp"), &keep).is_ok());
        assert!(check_temp_dir(&mods, &keep).is_err());
        assert!(check_temp_dir(dir.path().join("game"), &keep).is_err());
        assert!(check_temp_dir(dir.path(), &keep).is_err());
        assert!(check_temp_dir(dir.path().join("state"), &keep).is_err());
        assert!(check_temp_dir(mods.join("..").join(".."), &keep).is_err());
        assert!(check_temp_dir(mods.join("temp"), &keep).is_ok());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b");
        ensure_dir(&path).unwrap();
        ensure_dir(&path).unwrap();
        assert!(path.is_dir());
    }
}
