use crate::config::DelayRange;
use anyhow::{anyhow, Context, Result};
use headless_chrome::{Browser, LaunchOptions};
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

pub const LOGIN_URL: &str = "https://33m2.co.kr/webpc/login";
const LOGIN_BUTTON: &str = "//button[contains(text(),'로그인')]";
const SESSION_COOKIE: &str = "SESSION";

/// Account used to open a session on the room platform
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Value of the platform's `SESSION` cookie
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn cookie_header(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(len={})", self.0.len())
    }
}

/// Logs in through headless Chrome and hands back the session cookie
pub struct BrowserLogin {
    browser: Browser,
    keystroke: DelayRange,
}

impl BrowserLogin {
    /// Launch headless Chrome
    pub fn new() -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((1920, 1080)))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            keystroke: DelayRange::new(0.05, 0.15),
        })
    }

    /// Blocking; run it off the async runtime.
    pub fn login(&self, credentials: &Credentials) -> Result<SessionToken> {
        info!("🔐 Logging in as {}", credentials.email);
        let tab = self.browser.new_tab()?;

        tab.navigate_to(LOGIN_URL)?;
        tab.wait_until_navigated()?;

        tab.wait_for_element("#email")
            .context("Login form did not load")?
            .click()?;
        tab.type_str(&credentials.email)?;
        thread::sleep(Duration::from_millis(500));

        tab.wait_for_element("#password")?.click()?;
        // Typed one key at a time; the form rejects pasted input
        for ch in credentials.password.chars() {
            tab.type_str(&ch.to_string())?;
            thread::sleep(self.keystroke.sample());
        }

        tab.wait_for_xpath(LOGIN_BUTTON)
            .context("Login button not found")?
            .click()?;
        tab.wait_until_navigated()?;
        thread::sleep(Duration::from_secs(3));

        let cookies = tab.get_cookies()?;
        debug!(count = cookies.len(), "Cookies after login");

        let token = cookies
            .into_iter()
            .find(|c| c.name == SESSION_COOKIE)
            .map(|c| SessionToken::new(c.value))
            .ok_or_else(|| anyhow!("no {} cookie after login", SESSION_COOKIE))?;

        info!("✅ Logged in");
        Ok(token)
    }
}
