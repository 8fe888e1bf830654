//! `BrowserPage` over a Chrome tab driven through `headless_chrome`.
//!
//! `headless_chrome` is synchronous, so every call clones the tab handle and
//! runs on the blocking pool.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::browser::{BrowserPage, Locator};
use crate::error::AgentError;

/// Default remote debugging endpoint used by `--attach`.
pub const DEFAULT_DEBUG_ENDPOINT: &str = "http://127.0.0.1:9222";

const READY_STATE_TIMEOUT: Duration = Duration::from_secs(10);
const READY_STATE_POLL: Duration = Duration::from_millis(100);

/// One browser and the tab the agent drives.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    /// Connects to a Chrome already running with remote debugging and
    /// reuses its first tab.
    pub fn attach(endpoint: &str) -> Result<Self, AgentError> {
        info!(endpoint, "attaching to running Chrome");
        let browser = Browser::connect(endpoint.to_string())
            .map_err(|e| AgentError::browser(format!("attach to {endpoint} failed: {e}")))?;

        let existing = {
            let tabs = browser
                .get_tabs()
                .lock()
                .map_err(|_| AgentError::browser("tab list lock poisoned"))?;
            tabs.first().cloned()
        };
        let tab = match existing {
            Some(tab) => {
                debug!("using existing tab");
                tab
            }
            None => browser
                .new_tab()
                .map_err(|e| AgentError::browser(format!("failed to open tab: {e}")))?,
        };

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Starts a new Chrome on a persistent agent profile, so logins survive
    /// between runs.
    pub fn launch(headless: bool) -> Result<Self, AgentError> {
        let profile = agent_profile_dir()?;
        std::fs::create_dir_all(&profile)?;
        info!(headless, profile = %profile.display(), "launching Chrome");

        let options = LaunchOptions {
            headless,
            path: find_chrome(),
            user_data_dir: Some(profile),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(60),
            ..Default::default()
        };

        let browser = Browser::new(options)
            .map_err(|e| AgentError::browser(format!("browser launch failed: {e}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| AgentError::browser(format!("failed to open tab: {e}")))?;
        tab.navigate_to("about:blank")
            .map_err(|e| AgentError::browser(e.to_string()))?;

        info!("Chrome ready");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, AgentError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| AgentError::browser(format!("{op} task panicked: {e}")))?
    }
}

fn agent_profile_dir() -> Result<PathBuf, AgentError> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| AgentError::Config("no local data directory for the agent profile".into()))?;
    Ok(base.join("dom-pilot").join("agent_profile"))
}

/// Well-known install locations; `None` lets `headless_chrome` search itself.
fn find_chrome() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_PATH") {
        return Some(PathBuf::from(path));
    }
    let candidates = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
    ];
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn find<'t>(tab: &'t Tab, locator: &Locator) -> Result<Element<'t>, AgentError> {
    let found = match locator {
        Locator::Css(selector) => tab.find_element(selector),
        Locator::XPath(xpath) => tab.find_element_by_xpath(xpath),
    };
    found.map_err(|e| AgentError::element_not_found(format!("{locator}: {e}")))
}

fn eval(tab: &Tab, script: &str) -> Result<Value, AgentError> {
    let object = tab
        .evaluate(script, false)
        .map_err(|e| AgentError::browser(format!("evaluate failed: {e}")))?;
    Ok(object.value.unwrap_or(Value::Null))
}

fn eval_string(tab: &Tab, script: &str) -> Result<String, AgentError> {
    Ok(eval(tab, script)?
        .as_str()
        .map(str::to_string)
        .unwrap_or_default())
}

#[async_trait]
impl BrowserPage for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<(), AgentError> {
        let url = url.to_string();
        self.blocking("navigate", move |tab| {
            tab.navigate_to(&url)
                .map_err(|e| AgentError::Navigation(format!("{url}: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn wait_for_network_idle(&self) -> Result<(), AgentError> {
        self.blocking("wait_for_network_idle", |tab| {
            tab.wait_until_navigated()
                .map_err(|e| AgentError::timeout(format!("navigation did not settle: {e}")))?;
            let started = Instant::now();
            while started.elapsed() < READY_STATE_TIMEOUT {
                if eval_string(tab, "document.readyState")? == "complete" {
                    return Ok(());
                }
                std::thread::sleep(READY_STATE_POLL);
            }
            warn!("document never reached readyState complete");
            Ok(())
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AgentError> {
        let script = script.to_string();
        self.blocking("evaluate", move |tab| eval(tab, &script))
            .await
    }

    async fn wait_for_selector(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<(), AgentError> {
        let locator = locator.clone();
        self.blocking("wait_for_selector", move |tab| {
            let appeared = match &locator {
                Locator::Css(selector) => tab
                    .wait_for_element_with_custom_timeout(selector, timeout)
                    .map(|_| ()),
                Locator::XPath(xpath) => tab
                    .wait_for_xpath_with_custom_timeout(xpath, timeout)
                    .map(|_| ()),
            };
            appeared.map_err(|e| AgentError::timeout(format!("{locator}: {e}")))
        })
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<(), AgentError> {
        let locator = locator.clone();
        self.blocking("click", move |tab| {
            find(tab, &locator)?
                .click()
                .map_err(|e| AgentError::browser(format!("click on {locator} failed: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, locator: &Locator) -> Result<(), AgentError> {
        let locator = locator.clone();
        self.blocking("clear", move |tab| {
            find(tab, &locator)?
                .call_js_fn(
                    "function () { if ('value' in this) { this.value = ''; } }",
                    vec![],
                    false,
                )
                .map_err(|e| AgentError::browser(format!("clear on {locator} failed: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn type_text(
        &self,
        locator: &Locator,
        text: &str,
        char_delay: Duration,
    ) -> Result<(), AgentError> {
        let locator = locator.clone();
        let text = text.to_string();
        self.blocking("type_text", move |tab| {
            find(tab, &locator)?
                .click()
                .map_err(|e| AgentError::browser(format!("focus on {locator} failed: {e}")))?;
            if char_delay.is_zero() {
                tab.type_str(&text)
                    .map_err(|e| AgentError::browser(format!("typing failed: {e}")))?;
                return Ok(());
            }
            let mut buf = [0u8; 4];
            for ch in text.chars() {
                tab.send_character(ch.encode_utf8(&mut buf))
                    .map_err(|e| AgentError::browser(format!("typing failed: {e}")))?;
                std::thread::sleep(char_delay);
            }
            Ok(())
        })
        .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        self.blocking("screenshot", |tab| {
            let size = eval(
                tab,
                "[document.documentElement.scrollWidth, document.documentElement.scrollHeight]\
                 .join(',')",
            )?;
            let clip = size.as_str().and_then(|size| {
                let (width, height) = size.split_once(',')?;
                Some(Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: width.parse().ok()?,
                    height: height.parse().ok()?,
                    scale: 1.0,
                })
            });
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, clip, true)
                .map_err(|e| AgentError::browser(format!("screenshot failed: {e}")))
        })
        .await
    }

    async fn url(&self) -> Result<String, AgentError> {
        self.blocking("url", |tab| Ok(tab.get_url())).await
    }

    async fn title(&self) -> Result<String, AgentError> {
        self.blocking("title", |tab| eval_string(tab, "document.title"))
            .await
    }

    async fn page_text(&self) -> Result<String, AgentError> {
        self.blocking("page_text", |tab| {
            eval_string(tab, "document.body ? document.body.innerText : ''")
        })
        .await
    }
}
