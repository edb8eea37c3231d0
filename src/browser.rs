use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::{
    events::RequestPausedEvent, FailRequest, RequestPattern, RequestStage,
};
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;

use crate::error::NavigationError;

// ============================================================================
// Load policy constants
// ============================================================================

/// Navigation timeout for a candidate address.
pub const NAV_TIMEOUT: Duration = Duration::from_millis(120_000);
/// Wait for a `body` element after the first navigation.
pub const BODY_WAIT_TIMEOUT: Duration = Duration::from_millis(8_000);
/// Single best-effort attempt at closing a modal overlay.
pub const POPUP_CLOSE_TIMEOUT: Duration = Duration::from_millis(2_000);
/// Navigation timeout when following a services link on the live session.
pub const LINK_NAV_TIMEOUT: Duration = Duration::from_millis(60_000);
/// Wait for a `body` element after a follow-navigation.
pub const LINK_BODY_WAIT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Static-asset suffixes aborted by the interception rule. Blocking these
/// bounds load latency and memory on small hosts; the serialized document is
/// unaffected.
const BLOCKED_EXTENSIONS: [&str; 10] = [
    "png", "jpg", "jpeg", "svg", "gif", "webp", "css", "woff", "woff2", "ttf",
];

/// Controls that commonly close cookie banners and newsletter modals.
const POPUP_CLOSE_SELECTOR: &str =
    r#"[aria-label*="close" i], .modal-close, .popup-close, .mfp-close, .close-button, .close-btn"#;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/123.0.0.0 Safari/537.36",
    ]
});

// ============================================================================
// Rendering capability
// ============================================================================

/// One rendered document plus the still-open session that produced it.
pub struct LoadedPage {
    /// The candidate address that succeeded; base for resolving page links.
    pub url: String,
    /// Serialized HTML, captured once after the load settled.
    pub html: String,
    pub session: Box<dyn PageSession>,
}

impl std::fmt::Debug for LoadedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPage")
            .field("url", &self.url)
            .field("html", &self.html)
            .field("session", &"<dyn PageSession>")
            .finish()
    }
}

/// Loads one candidate address in a fresh, isolated browser session.
///
/// Every operation on the underlying browser is failable; a failed attempt
/// must release its session before the caller moves to the next candidate.
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<LoadedPage, NavigationError>;
}

/// A live page that can be re-navigated once for the services fallback.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate the existing page and return the re-serialized HTML.
    async fn goto(
        &self,
        url: &str,
        nav_timeout: Duration,
        body_timeout: Duration,
    ) -> Result<String>;
}

// ============================================================================
// Headless Chrome implementation
// ============================================================================

/// Launches one headless Chrome process per candidate attempt. Dropping the
/// returned session kills the process, so cookies and navigation history
/// cannot leak into a retry.
pub struct ChromeLoader;

#[async_trait]
impl PageLoader for ChromeLoader {
    async fn load(&self, url: &str) -> Result<LoadedPage, NavigationError> {
        load_candidate(url).map_err(|e| NavigationError::new(url, e))
    }
}

fn load_candidate(url: &str) -> Result<LoadedPage> {
    let (browser, tab) = launch_session()?;

    tab.set_default_timeout(NAV_TIMEOUT);
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;

    // Softer wait than a load event: confirms navigation produced a document
    // instead of hanging mid-load.
    tab.wait_for_element_with_custom_timeout("body", BODY_WAIT_TIMEOUT)?;

    dismiss_popup(&tab);

    let html = tab.get_content()?;

    Ok(LoadedPage {
        url: url.to_string(),
        html,
        session: Box::new(ChromeSession { _browser: browser, tab }),
    })
}

fn launch_session() -> Result<(Browser, Arc<Tab>)> {
    let args = vec![
        OsStr::new("--no-sandbox"),
        OsStr::new("--disable-setuid-sandbox"),
        OsStr::new("--disable-dev-shm-usage"),
        OsStr::new("--disable-gpu"),
        OsStr::new("--mute-audio"),
        OsStr::new("--ignore-certificate-errors"),
        OsStr::new("--ignore-certificate-errors-spki-list"),
    ];

    let browser = Browser::new(LaunchOptions {
        headless: true,
        window_size: Some((1920, 1080)),
        // Must outlive the navigation timeout or the connection watchdog
        // kills a slow but live load.
        idle_browser_timeout: Duration::from_secs(180),
        args,
        ..Default::default()
    })?;

    let tab = browser.new_tab()?;

    use rand::seq::SliceRandom;
    let user_agent = USER_AGENTS
        .choose(&mut rand::thread_rng())
        .unwrap_or(&USER_AGENTS[0]);
    tab.set_user_agent(user_agent, None, None)?;

    install_asset_blocking(&tab)?;

    Ok((browser, tab))
}

/// Abort image/stylesheet/font requests and known static-asset paths for the
/// whole session.
fn install_asset_blocking(tab: &Arc<Tab>) -> Result<()> {
    let patterns = vec![RequestPattern {
        url_pattern: Some("*".to_string()),
        resource_Type: None,
        request_stage: Some(RequestStage::Request),
    }];
    tab.enable_fetch(Some(&patterns), None)?;
    tab.enable_request_interception(Arc::new(AssetBlocker))?;
    Ok(())
}

struct AssetBlocker;

impl RequestInterceptor for AssetBlocker {
    fn intercept(
        &self,
        _transport: Arc<Transport>,
        _session_id: SessionId,
        event: RequestPausedEvent,
    ) -> RequestPausedDecision {
        let params = event.params;
        if is_blocked_request(&params.request.url, &params.resource_Type) {
            RequestPausedDecision::Fail(FailRequest {
                request_id: params.request_id,
                error_reason: ErrorReason::Aborted,
            })
        } else {
            RequestPausedDecision::Continue(None)
        }
    }
}

fn is_blocked_request(url: &str, resource_type: &ResourceType) -> bool {
    if matches!(
        resource_type,
        ResourceType::Image | ResourceType::Stylesheet | ResourceType::Font
    ) {
        return true;
    }
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();
    match path.rsplit_once('.') {
        Some((_, ext)) => BLOCKED_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// Best-effort: pop-up dismissal is an enhancement, never a reason to fail
/// the attempt. Not found, not clickable and timeout all land here.
fn dismiss_popup(tab: &Arc<Tab>) {
    if let Ok(element) = tab.wait_for_element_with_custom_timeout(POPUP_CLOSE_SELECTOR, POPUP_CLOSE_TIMEOUT)
    {
        if element.click().is_ok() {
            println!("🧹 Dismissed a pop-up overlay");
        }
    }
}

struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn goto(
        &self,
        url: &str,
        nav_timeout: Duration,
        body_timeout: Duration,
    ) -> Result<String> {
        self.tab.set_default_timeout(nav_timeout);
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        self.tab
            .wait_for_element_with_custom_timeout("body", body_timeout)?;
        let html = self.tab.get_content()?;
        Ok(html)
    }
}
