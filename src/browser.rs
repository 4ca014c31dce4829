//! Mod site automation over the Chrome DevTools Protocol.
//!
//! One browser is launched per run. Downloads triggered from the page land in the run's temp
//! directory and are picked up by polling that directory.

use std::{
    collections::HashSet,
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use chromiumoxide::{
    cdp::browser_protocol::{
        browser::{SetDownloadBehaviorBehavior, SetDownloadBehaviorParams},
        network::{CookieParam, TimeSinceEpoch},
    },
    Browser, BrowserConfig, Page,
};
use futures_util::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::{
    config::Config,
    core::{manage::is_zip, update::ModSource},
    error::ModsyncError,
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SLOW_DOWNLOAD_BUTTON: &str = "#slowDownloadButton";

lazy_static! {
    static ref VERSION_STAT: Regex =
        Regex::new(r#"(?s)class="stat-version".*?<div class="stat">\s*([^<]*?)\s*</div>"#)
            .expect("version regex");
}

/// Pull the published version out of a mod page
pub fn extract_version(html: &str) -> Option<String> {
    let raw = VERSION_STAT.captures(html)?.get(1)?.as_str().trim();
    let version = raw
        .strip_prefix(['v', 'V'])
        .unwrap_or(raw)
        .trim();
    (!version.is_empty()).then(|| version.to_owned())
}

/// Whether a link's text marks it as the manual download link
pub fn is_manual_link(text: &str) -> bool {
    text.to_lowercase().contains("manual")
}

/// Make a link found on the page absolute
pub fn resolve_href(site_url: &str, href: &str) -> Result<String, ModsyncError> {
    Ok(Url::parse(site_url)?.join(href)?.into())
}

/// A cookie as exported by browser cookie extensions
///
/// Fields the CDP doesn't accept as-is (`sameSite`, `priority`, `hostOnly`...) are ignored
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: Option<bool>,
    #[serde(rename = "httpOnly")]
    pub http_only: Option<bool>,
    #[serde(rename = "expirationDate", alias = "expires")]
    pub expiration_date: Option<f64>,
}

impl StoredCookie {
    pub fn to_param(&self) -> Result<CookieParam, ModsyncError> {
        let mut builder = CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone());
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(path) = &self.path {
            builder = builder.path(path.clone());
        }
        if let Some(secure) = self.secure {
            builder = builder.secure(secure);
        }
        if let Some(http_only) = self.http_only {
            builder = builder.http_only(http_only);
        }
        // session cookies are exported with no expiry or a negative one
        if let Some(expires) = self.expiration_date.filter(|e| *e > 0.0) {
            builder = builder.expires(TimeSinceEpoch::new(expires));
        }
        builder.build().map_err(ModsyncError::MiscError)
    }
}

/// Parse the contents of a cookie file
pub fn parse_cookies(raw: &str) -> Result<Vec<StoredCookie>, ModsyncError> {
    Ok(serde_json::from_str(raw)?)
}

/// Poll `probe` until it yields a value or `timeout` runs out
async fn wait_for<T, F, Fut>(timeout: Duration, what: &str, mut probe: F) -> Result<T, ModsyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(v) = probe().await {
            return Ok(v);
        }
        if Instant::now() >= deadline {
            return Err(ModsyncError::Timeout(what.to_owned()));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn zip_files(dir: &Path) -> Result<HashSet<PathBuf>, ModsyncError> {
    Ok(fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_zip(p))
        .collect())
}

fn has_partial_downloads(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(Result::ok).any(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == "crdownload" || ext == "tmp")
            })
        })
        .unwrap_or(false)
}

/// Wait for a zip that isn't in `before` to finish downloading into `dir`
pub async fn wait_for_download(
    dir: &Path,
    before: &HashSet<PathBuf>,
    timeout: Duration,
) -> Result<PathBuf, ModsyncError> {
    wait_for(timeout, "download to finish", || async move {
        if has_partial_downloads(dir) {
            trace!("Download still in progress");
            return None;
        }
        let mut new = zip_files(dir)
            .ok()?
            .into_iter()
            .filter(|p| !before.contains(p))
            .collect::<Vec<_>>();
        new.sort();
        new.into_iter().next()
    })
    .await
}

pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    /// Mod whose page is currently open in `page`
    current_mod: Option<u32>,
    download_dir: PathBuf,
    config: Config,
}

impl BrowserSession {
    /// Start the browser, point its downloads at `download_dir` and log in with the configured cookies
    pub async fn launch(config: &Config, download_dir: &Path) -> Result<Self, ModsyncError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled");
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(ModsyncError::MiscError)?;

        debug!("Launching browser");
        let (browser, mut handler) = Browser::launch(browser_config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("Browser handler: {}", e);
                }
            }
        });

        let download_dir = download_dir.to_path_buf();
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy())
            .build()
            .map_err(ModsyncError::MiscError)?;
        browser.execute(params).await?;
        debug!("Downloads go to {}", download_dir.display());

        let page = browser.new_page(config.site_url.as_str()).await?;
        tokio::time::sleep(config.settle()).await;

        let session = Self {
            browser,
            handler,
            page,
            current_mod: None,
            download_dir,
            config: config.clone(),
        };
        session.load_cookies(&config.cookies_file).await;
        Ok(session)
    }

    /// Add the cookies saved at `path` to the session and reload
    ///
    /// Every failure is logged, the session just stays logged out
    pub async fn load_cookies(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Cookie file {} not found, continuing without logging in", path.display());
            return;
        }

        let cookies = match fs::read_to_string(path)
            .map_err(ModsyncError::from)
            .and_then(|raw| parse_cookies(&raw))
        {
            Ok(c) => c,
            Err(e) => {
                error!("Unable to read cookies from {}: {}", path.display(), e);
                return;
            }
        };

        let mut loaded = 0;
        for cookie in &cookies {
            let res = match cookie.to_param() {
                Ok(param) => self.page.set_cookie(param).await.map(|_| ()).map_err(ModsyncError::from),
                Err(e) => Err(e),
            };
            match res {
                Ok(()) => loaded += 1,
                Err(e) => error!("Cookie '{}' rejected: {}", cookie.name, e),
            }
        }
        info!("Loaded {}/{} cookies", loaded, cookies.len());

        if let Err(e) = self.page.reload().await {
            error!("Reload after setting cookies failed: {}", e);
        }
        tokio::time::sleep(self.config.settle()).await;
    }

    async fn open_mod_page(&mut self, mod_id: u32) -> Result<(), ModsyncError> {
        let url = self.config.mod_page_url(mod_id);
        info!("Opening mod page {}", url);
        self.current_mod = None;
        self.page.goto(url).await?;
        self.current_mod = Some(mod_id);
        Ok(())
    }

    async fn find_manual_link(&self) -> Result<String, ModsyncError> {
        let page = &self.page;
        let href = wait_for(self.config.element_timeout(), "manual download link", || async move {
            for link in page.find_elements("a").await.ok()? {
                let text = link.inner_text().await.ok().flatten().unwrap_or_default();
                if is_manual_link(&text) {
                    if let Ok(Some(href)) = link.attribute("href").await {
                        return Some(href);
                    }
                }
            }
            None
        })
        .await?;
        resolve_href(&self.config.site_url, &href)
    }

    /// Shut the browser down, logging anything that goes wrong
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            error!("Error closing browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            error!("Error waiting for browser to exit: {}", e);
        }
        if let Err(e) = self.handler.await {
            debug!("Browser handler ended abnormally: {}", e);
        }
    }
}

impl ModSource for BrowserSession {
    async fn remote_version(&mut self, mod_id: u32) -> Result<String, ModsyncError> {
        self.open_mod_page(mod_id).await?;
        let page = &self.page;
        wait_for(self.config.element_timeout(), "mod version", || async move {
            let html = page.content().await.ok()?;
            extract_version(&html)
        })
        .await
    }

    async fn download(&mut self, mod_id: u32) -> Result<PathBuf, ModsyncError> {
        if self.current_mod != Some(mod_id) {
            self.open_mod_page(mod_id).await?;
        }

        let manual_url = self.find_manual_link().await?;
        debug!("Manual download page {}", manual_url);
        self.current_mod = None;
        self.page.goto(manual_url).await?;

        let page = &self.page;
        let button = wait_for(self.config.element_timeout(), "slow download button", || async move {
            page.find_element(SLOW_DOWNLOAD_BUTTON).await.ok()
        })
        .await?;

        let before = zip_files(&self.download_dir)?;
        button.click().await?;
        info!("Slow download started");

        wait_for_download(&self.download_dir, &before, self.config.download_timeout()).await
    }
}
