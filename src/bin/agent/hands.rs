use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use web_navigator::{BackendError, BrowserBackend, BrowserConfig, Screenshot};

/// Chrome driven over the DevTools protocol. Created once, reused for all
/// tasks; each task gets a fresh tab through `restart`.
pub struct ChromeBackend {
    browser: Arc<Browser>,
    tab: Arc<Tab>,
}

impl ChromeBackend {
    /// Blocking: run it under `spawn_blocking`.
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        if let Some(url) = &config.attach_url {
            info!(%url, "attaching to running Chrome");
            match Browser::connect(url.clone()) {
                Ok(browser) => {
                    let existing = browser
                        .get_tabs()
                        .lock()
                        .ok()
                        .and_then(|tabs| tabs.first().cloned());
                    let tab = match existing {
                        Some(tab) => tab,
                        None => browser.new_tab()?,
                    };
                    info!("attached to existing Chrome");
                    return Ok(Self {
                        browser: Arc::new(browser),
                        tab,
                    });
                }
                Err(e) => warn!(error = %e, "could not attach, launching a new Chrome"),
            }
        }

        let profile = profile_dir(config)?;
        std::fs::create_dir_all(&profile)
            .with_context(|| format!("creating Chrome profile at {}", profile.display()))?;

        let options = LaunchOptions {
            headless: config.headless,
            path: config.chrome_path.clone().or_else(find_chrome),
            user_data_dir: Some(profile),
            window_size: Some(config.window_size),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        info!(headless = config.headless, "starting Chrome");
        let browser = Browser::new(options).context("Browser launch failed")?;
        let tab = browser.new_tab().context("creating tab")?;
        tab.navigate_to("about:blank")?;
        info!("Chrome ready");

        Ok(Self {
            browser: Arc::new(browser),
            tab,
        })
    }

    /// Run a blocking CDP call off the async runtime.
    async fn with_tab<T, F>(&self, operation: &'static str, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.clone();
        match tokio::task::spawn_blocking(move || f(&tab)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(operation, &e)),
            Err(join) => Err(BackendError::fatal(format!("{operation} worker died: {join}"))),
        }
    }
}

#[async_trait]
impl BrowserBackend for ChromeBackend {
    async fn screenshot(&mut self) -> Result<Screenshot, BackendError> {
        self.with_tab("screenshot", |tab| {
            let png = tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?;
            Ok(Screenshot::from_png(png))
        })
        .await
    }

    async fn click(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        self.with_tab("click", move |tab| {
            tab.click_point(Point {
                x: f64::from(x),
                y: f64::from(y),
            })?;
            Ok(())
        })
        .await
    }

    async fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        let text = text.to_string();
        self.with_tab("type", move |tab| {
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&mut self, key: &str) -> Result<(), BackendError> {
        let key = key.to_string();
        self.with_tab("key press", move |tab| {
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn scroll(&mut self, dx: i64, dy: i64) -> Result<(), BackendError> {
        self.with_tab("scroll", move |tab| {
            tab.evaluate(&format!("window.scrollBy({dx}, {dy})"), false)?;
            Ok(())
        })
        .await
    }

    async fn goto(&mut self, url: &str) -> Result<(), BackendError> {
        let url = url.to_string();
        self.with_tab("navigation", move |tab| {
            tab.navigate_to(&url)
                .with_context(|| format!("Failed to open URL: {url}"))?;
            Ok(())
        })
        .await
    }

    async fn go_back(&mut self) -> Result<(), BackendError> {
        self.with_tab("back", |tab| {
            tab.evaluate("history.back()", false)?;
            Ok(())
        })
        .await
    }

    async fn refresh(&mut self) -> Result<(), BackendError> {
        self.with_tab("refresh", |tab| {
            tab.reload(false, None)?;
            Ok(())
        })
        .await
    }

    async fn wait_for_load(&mut self) -> Result<(), BackendError> {
        self.with_tab("page load", |tab| {
            tab.wait_until_navigated()
                .context("Navigation did not complete")?;
            Ok(())
        })
        .await
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        self.with_tab("url", |tab| Ok(tab.get_url())).await
    }

    async fn restart(&mut self) -> Result<(), BackendError> {
        let browser = self.browser.clone();
        let old = self.tab.clone();
        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            if let Err(e) = old.close(false) {
                debug!(error = %e, "old tab did not close");
            }
            Ok(tab)
        })
        .await
        .map_err(|join| BackendError::fatal(format!("restart worker died: {join}")))?
        .map_err(|e| classify("new tab", &e))?;

        self.tab = tab;
        Ok(())
    }
}

/// A dead connection means the session is gone; anything else is a failed
/// action on a live page.
fn classify(operation: &'static str, error: &anyhow::Error) -> BackendError {
    let message = format!("{error:#}");
    let lower = message.to_lowercase();
    let dead = (lower.contains("connection") && lower.contains("closed"))
        || lower.contains("target closed")
        || lower.contains("no such target")
        || lower.contains("browser has disconnected");
    if dead {
        BackendError::fatal(message)
    } else {
        BackendError::action(operation, message)
    }
}

fn profile_dir(config: &BrowserConfig) -> Result<PathBuf> {
    if let Some(dir) = &config.profile_dir {
        return Ok(dir.clone());
    }
    match dirs::data_local_dir() {
        Some(base) => Ok(base.join("web-navigator").join("chrome-profile")),
        None => Ok(std::env::current_dir()?.join("agent_profile")),
    }
}

// None lets headless_chrome run its own lookup.
fn find_chrome() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(
            local
                .join("Google")
                .join("Chrome")
                .join("Application")
                .join("chrome.exe"),
        );
    }
    candidates.into_iter().find(|path| path.exists())
}
