use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

use crate::error::ModsyncError;

pub const CONFIG_FILE_NAME: &str = "modsync.json5";
pub const MOD_LIST_FILE_NAME: &str = "mod_load_order.txt";

const DEFAULT_MODS_DIR: &str = "Z:/SteamLibrary/steamapps/common/Warhammer 40,000 DARKTIDE/mods";

fn default_mods() -> BTreeMap<String, u32> {
    [
        ("animation_events", 21),
        ("book_finder", 121),
        ("ChatBlock", 68),
        ("Decode_Helper", 252),
        ("NumericUI", 14),
        ("PingMonitor", 13),
        ("scoreboard", 22),
        ("SoloPlay", 176),
        ("Spidey Sense", 268),
        ("true_level", 156),
    ]
    .into_iter()
    .map(|(name, id)| (name.to_owned(), id))
    .collect()
}

/// Everything a run needs to know. Missing keys in the config file fall back to [`Config::default`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Root of the mod hosting site, without a trailing slash
    pub site_url: String,
    /// Game segment of mod page URLs
    pub game_domain: String,
    /// Where archives get extracted. When unset the Steam library is searched (requires the `steam` feature)
    pub mods_dir: Option<PathBuf>,
    /// Defaults to `mod_load_order.txt` inside the mods directory
    pub mod_list_file: Option<PathBuf>,
    /// Download target, removed at the end of every run
    pub temp_dir: PathBuf,
    pub version_file: PathBuf,
    pub cookies_file: PathBuf,
    pub headless: bool,
    pub element_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Fixed pause after loading the site root and after injecting cookies
    pub settle_secs: u64,
    /// Mod name as it appears in the mod list -> numeric id on the site
    pub mods: BTreeMap<String, u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: "https://www.nexusmods.com".into(),
            game_domain: "warhammer40kdarktide".into(),
            mods_dir: Some(PathBuf::from(DEFAULT_MODS_DIR)),
            mod_list_file: None,
            temp_dir: PathBuf::from("temp"),
            version_file: PathBuf::from("mod_versions.json"),
            cookies_file: PathBuf::from("cookies.json"),
            headless: true,
            element_timeout_secs: 15,
            download_timeout_secs: 60,
            settle_secs: 3,
            mods: default_mods(),
        }
    }
}

impl Config {
    /// Load the config at `path`, or the defaults if there's no such file
    ///
    /// # Errors
    /// * IO errors other than the file not existing
    /// * The file isn't valid JSON5 or has fields of the wrong type
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModsyncError> {
        let path = path.as_ref();
        if !path.try_exists()? {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)?;
        let config: Self = json5::from_str(&raw)?;
        info!("Loaded config from {}", path.display());
        debug!("{config:?}");
        Ok(config)
    }

    /// The default config, pretty-printed so it can be saved and edited
    pub fn write_default() -> Result<String, ModsyncError> {
        Ok(serde_json::to_string_pretty(&Self::default())?)
    }

    pub fn mod_id(&self, name: impl AsRef<str>) -> Option<u32> {
        self.mods.get(name.as_ref()).copied()
    }

    pub fn mod_page_url(&self, mod_id: u32) -> String {
        format!(
            "{}/{}/mods/{}",
            self.site_url.trim_end_matches('/'),
            self.game_domain,
            mod_id
        )
    }

    /// Resolve the directory archives are extracted into
    ///
    /// # Errors
    /// * `MissingModsDir` if it isn't configured and can't be located
    pub fn mods_dir(&self) -> Result<PathBuf, ModsyncError> {
        if let Some(dir) = &self.mods_dir {
            return Ok(dir.clone());
        }

        #[cfg(feature = "steam")]
        if let Some(game) = crate::core::utils::steam::darktide() {
            debug!("Found Darktide at {}", game.display());
            return Ok(game.join("mods"));
        }

        Err(ModsyncError::MissingModsDir)
    }

    pub fn mod_list_file(&self) -> Result<PathBuf, ModsyncError> {
        match &self.mod_list_file {
            Some(p) => Ok(p.clone()),
            None => Ok(self.mods_dir()?.join(MOD_LIST_FILE_NAME)),
        }
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}
