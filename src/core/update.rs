use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::{
    browser::BrowserSession,
    config::Config,
    core::{
        manage,
        utils::{self, TempDir},
        version::{self, Decision},
    },
    error::ModsyncError,
    model::{Outcome, RunSummary, VersionIndex},
};

/// Somewhere mods can be checked and downloaded from
#[allow(async_fn_in_trait)]
pub trait ModSource {
    /// The version currently published for `mod_id`
    async fn remote_version(&mut self, mod_id: u32) -> Result<String, ModsyncError>;

    /// Download the latest file of `mod_id`, returning where it was saved
    async fn download(&mut self, mod_id: u32) -> Result<PathBuf, ModsyncError>;
}

/// Check a single mod and download it if the site has a newer version
///
/// The version file is read before deciding and rewritten after a successful download
pub async fn process_mod(
    source: &mut impl ModSource,
    config: &Config,
    name: &str,
) -> Outcome {
    let Some(mod_id) = config.mod_id(name) else {
        info!("Mod '{}' is not tracked", name);
        return Outcome::Untracked;
    };
    info!("Processing mod '{}' (ID: {})", name, mod_id);

    let remote = match source.remote_version(mod_id).await {
        Ok(v) => v,
        Err(e) => {
            error!("Couldn't find the version of '{}': {}", name, e);
            return Outcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    let mut index = VersionIndex::load(&config.version_file);
    let key = mod_id.to_string();
    let stored = index.get(&key).map(String::from);

    let decision = match version::decide(&remote, stored.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            error!("Can't use the version of '{}': {}", name, e);
            return Outcome::Failed {
                reason: e.to_string(),
            };
        }
    };
    debug!("'{}' remote {} local {:?} -> {:?}", name, remote, stored, decision);

    match decision {
        Decision::UpToDate => {
            info!("'{}' is up to date ({})", name, remote);
            Outcome::UpToDate
        }
        Decision::StaleLocal => {
            let local = stored.unwrap_or_default();
            warn!(
                "'{}' local version {} is newer than remote {}, skipping",
                name, local, remote
            );
            Outcome::StaleLocal { local, remote }
        }
        Decision::NeedsUpdate => match source.download(mod_id).await {
            Ok(file) => {
                info!("Downloaded '{}' {} to {}", name, remote, file.display());
                index.set(key, remote.clone());
                if let Err(e) = index.save(&config.version_file) {
                    error!("Unable to record version of '{}': {}", name, e);
                }
                Outcome::Updated { version: remote }
            }
            Err(e) => {
                error!("Error downloading mod '{}' ({}): {}", name, mod_id, e);
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        },
    }
}

/// Process every mod in `names` in order. Failures are recorded and the loop carries on
pub async fn sync_mods(
    source: &mut impl ModSource,
    config: &Config,
    names: &[String],
) -> Vec<(String, Outcome)> {
    let mut outcomes = Vec::with_capacity(names.len());
    for name in names {
        let outcome = process_mod(source, config, name).await;
        outcomes.push((name.clone(), outcome));
    }
    outcomes
}

/// Check, download and install every mod in `names`, then extract what was downloaded
pub async fn sync_and_install(
    source: &mut impl ModSource,
    config: &Config,
    names: &[String],
    download_dir: &Path,
    mods_dir: &Path,
) -> Result<RunSummary, ModsyncError> {
    let mods = sync_mods(source, config, names).await;

    info!("Extracting archives...");
    let extracted = manage::extract_archives(download_dir, mods_dir)?;

    Ok(RunSummary { mods, extracted })
}

/// Run a full update: launch the browser, process the mod list, extract the downloads and clean up
///
/// The browser is shut down and the temp directory removed whether or not the run succeeds
pub async fn run(config: &Config) -> Result<RunSummary, ModsyncError> {
    let mods_dir = config.mods_dir()?;
    let mod_list = config.mod_list_file()?;
    utils::ensure_dir(&mods_dir)?;
    utils::check_temp_dir(
        &config.temp_dir,
        &[
            mods_dir.as_path(),
            mod_list.as_path(),
            config.version_file.as_path(),
            config.cookies_file.as_path(),
        ],
    )?;
    let temp = TempDir::create(&config.temp_dir)?;

    let mut session = BrowserSession::launch(config, &temp).await?;

    let res: Result<RunSummary, ModsyncError> = async {
        info!("Reading mod list...");
        let names = utils::read_mod_list(&mod_list)?;
        sync_and_install(&mut session, config, &names, &temp, &mods_dir).await
    }
    .await;

    info!("Cleaning up...");
    session.close().await;
    drop(temp);

    res
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        fs::{self, File},
        io::Write,
        path::{Path, PathBuf},
    };

    use zip::{write::SimpleFileOptions, ZipWriter};

    use super::{process_mod, sync_and_install, sync_mods, ModSource};
    use crate::{
        config::Config,
        error::ModsyncError,
        model::{Outcome, VersionIndex},
    };

    /// Serves versions from a map and "downloads" by writing a zip into `dir`
    struct FakeSite {
        versions: HashMap<u32, String>,
        broken_downloads: Vec<u32>,
        dir: PathBuf,
        downloads: Vec<u32>,
    }

    impl FakeSite {
        fn new(dir: &Path, versions: &[(u32, &str)]) -> Self {
            Self {
                versions: versions
                    .iter()
                    .map(|(id, v)| (*id, v.to_string()))
                    .collect(),
                broken_downloads: vec![],
                dir: dir.to_path_buf(),
                downloads: vec![],
            }
        }
    }

    impl ModSource for FakeSite {
        async fn remote_version(&mut self, mod_id: u32) -> Result<String, ModsyncError> {
            self.versions
                .get(&mod_id)
                .cloned()
                .ok_or_else(|| ModsyncError::Timeout("mod version".into()))
        }

        async fn download(&mut self, mod_id: u32) -> Result<PathBuf, ModsyncError> {
            if self.broken_downloads.contains(&mod_id) {
                return Err(ModsyncError::Timeout("download".into()));
            }
            self.downloads.push(mod_id);
            let path = self.dir.join(format!("{mod_id}.zip"));
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            zip.start_file(format!("mod_{mod_id}/mod_{mod_id}.mod"), SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"return {}").unwrap();
            zip.finish().unwrap();
            Ok(path)
        }
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            mods_dir: Some(dir.join("mods")),
            version_file: dir.join("mod_versions.json"),
            mods: [("ChatBlock", 68), ("NumericUI", 14), ("true_level", 156)]
                .into_iter()
                .map(|(n, id)| (n.to_owned(), id))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn new_mod_is_downloaded_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut site = FakeSite::new(dir.path(), &[(68, "1.3")]);

        let outcome = process_mod(&mut site, &config, "ChatBlock").await;

        assert_eq!(outcome, Outcome::Updated { version: "1.3".into() });
        assert_eq!(site.downloads, vec![68]);
        assert_eq!(VersionIndex::load(&config.version_file).get("68"), Some("1.3"));
    }

    #[tokio::test]
    async fn decisions_follow_stored_versions() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut index = VersionIndex::default();
        index.set("68", "1.2.0");
        index.set("14", "2.0");
        index.set("156", "1.0");
        index.save(&config.version_file).unwrap();

        let mut site = FakeSite::new(dir.path(), &[(68, "1.2"), (14, "1.9"), (156, "1.10")]);
        let names = ["ChatBlock", "NumericUI", "true_level"].map(String::from);
        let outcomes = sync_mods(&mut site, &config, &names).await;

        assert_eq!(outcomes[0].1, Outcome::UpToDate);
        assert_eq!(
            outcomes[1].1,
            Outcome::StaleLocal {
                local: "2.0".into(),
                remote: "1.9".into()
            }
        );
        assert_eq!(outcomes[2].1, Outcome::Updated { version: "1.10".into() });
        assert_eq!(site.downloads, vec![156]);

        let index = VersionIndex::load(&config.version_file);
        assert_eq!(index.get("14"), Some("2.0"));
        assert_eq!(index.get("156"), Some("1.10"));
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut site = FakeSite::new(dir.path(), &[(14, "1.0"), (156, "beta"), (68, "3.1")]);
        site.broken_downloads.push(14);

        let names = ["NumericUI", "Unknown Mod", "true_level", "ChatBlock"].map(String::from);
        let outcomes = sync_mods(&mut site, &config, &names).await;

        assert!(matches!(outcomes[0].1, Outcome::Failed { .. }));
        assert_eq!(outcomes[1].1, Outcome::Untracked);
        assert!(matches!(outcomes[2].1, Outcome::Failed { .. }));
        assert_eq!(outcomes[3].1, Outcome::Updated { version: "3.1".into() });

        let index = VersionIndex::load(&config.version_file);
        assert_eq!(index.get("14"), None);
        assert_eq!(index.get("156"), None);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn unsaved_version_still_counts_as_updated() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "regular file").unwrap();
        let config = Config {
            version_file: blocker.join("mod_versions.json"),
            ..test_config(dir.path())
        };

        let mut site = FakeSite::new(dir.path(), &[(68, "1.0"), (14, "2.1")]);
        let names = ["ChatBlock", "NumericUI"].map(String::from);
        let outcomes = sync_mods(&mut site, &config, &names).await;

        assert_eq!(outcomes[0].1, Outcome::Updated { version: "1.0".into() });
        assert_eq!(outcomes[1].1, Outcome::Updated { version: "2.1".into() });
        assert_eq!(site.downloads, vec![68, 14]);
        assert!(blocker.is_file());
    }

    #[tokio::test]
    async fn missing_remote_version_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut site = FakeSite::new(dir.path(), &[]);

        let outcome = process_mod(&mut site, &config, "ChatBlock").await;
        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert!(site.downloads.is_empty());
        assert!(!config.version_file.exists());
    }

    #[tokio::test]
    async fn downloads_are_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let downloads = dir.path().join("temp");
        let mods_dir = dir.path().join("mods");
        fs::create_dir_all(&downloads).unwrap();
        fs::create_dir_all(&mods_dir).unwrap();

        let mut site = FakeSite::new(&downloads, &[(68, "1.0"), (14, "1.0")]);
        let names = ["ChatBlock", "NumericUI"].map(String::from);
        let summary = sync_and_install(&mut site, &config, &names, &downloads, &mods_dir)
            .await
            .unwrap();

        assert_eq!(summary.updated(), 2);
        assert_eq!(summary.extracted.len(), 2);
        assert!(mods_dir.join("mod_68/mod_68.mod").is_file());
        assert!(mods_dir.join("mod_14/mod_14.mod").is_file());
    }
}
