//! Session cookies read straight from local browser profiles
//!
//! Browsers are tried in a fixed order and the first one holding both
//! `sessionid` and `csrftoken` for the environment's host wins.

use crate::api::models::SessionCredential;
use log::debug;

pub const SESSION_COOKIE: &str = "sessionid";
pub const CSRF_COOKIE: &str = "csrftoken";

/// Report at most this many browser problems
const MAX_REPORTED_ERRORS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
}

/// Reads the cookies of one browser for the given host names
pub type CookieLoader = fn(Vec<String>) -> Result<Vec<BrowserCookie>, String>;

/// A session found in a browser
#[derive(Debug, Clone)]
pub struct BrowserSession {
    pub browser: String,
    pub session: SessionCredential,
}

macro_rules! rookie_loader {
    ($load:path) => {
        (|domains: Vec<String>| -> Result<Vec<BrowserCookie>, String> {
            $load(Some(domains))
                .map(|cookies| {
                    cookies
                        .into_iter()
                        .map(|cookie| BrowserCookie {
                            name: cookie.name,
                            value: cookie.value,
                        })
                        .collect()
                })
                .map_err(|e| e.to_string())
        }) as CookieLoader
    };
}

/// Browsers to search, in order of preference
pub fn supported_browsers() -> Vec<(&'static str, CookieLoader)> {
    let mut browsers: Vec<(&'static str, CookieLoader)> = vec![
        ("Chrome", rookie_loader!(rookie::chrome)),
        ("Firefox", rookie_loader!(rookie::firefox)),
    ];

    #[cfg(target_os = "macos")]
    browsers.push(("Safari", rookie_loader!(rookie::safari)));

    browsers.extend([
        ("Edge", rookie_loader!(rookie::edge)),
        ("Brave", rookie_loader!(rookie::brave)),
        ("Opera", rookie_loader!(rookie::opera)),
        ("Chromium", rookie_loader!(rookie::chromium)),
    ]);
    browsers
}

/// Host part of a base URL, e.g. `https://dev.datarails.com/` -> `dev.datarails.com`
pub fn cookie_domain(base_url: &str) -> String {
    let without_scheme = base_url
        .split_once("://")
        .map_or(base_url, |(_, rest)| rest);
    let host = without_scheme.split('/').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default().to_string()
}

/// The session pair, if both cookies are present and non-empty
pub fn session_from_cookies(cookies: &[BrowserCookie]) -> Option<SessionCredential> {
    let find = |name: &str| {
        cookies
            .iter()
            .find(|cookie| cookie.name == name && !cookie.value.is_empty())
            .map(|cookie| cookie.value.clone())
    };

    Some(SessionCredential::new(find(SESSION_COOKIE)?, find(CSRF_COOKIE)?))
}

/// Search `browsers` for a Finance OS session on the host of `base_url`
pub fn find_session(base_url: &str, browsers: &[(&str, CookieLoader)]) -> anyhow::Result<BrowserSession> {
    let domain = cookie_domain(base_url);
    let mut problems = Vec::new();

    for (name, load) in browsers {
        debug!("Checking {} for {} cookies", name, domain);
        match load(vec![domain.clone()]) {
            Ok(cookies) => {
                if let Some(session) = session_from_cookies(&cookies) {
                    debug!("Found session cookies in {}", name);
                    return Ok(BrowserSession {
                        browser: name.to_string(),
                        session,
                    });
                }
            }
            Err(e) => {
                debug!("Could not read {} cookies: {}", name, e);
                if let Some(problem) = describe_problem(name, &e) {
                    problems.push(problem);
                }
            }
        }
    }

    if problems.is_empty() {
        anyhow::bail!("No Finance OS session found for {}. Please log in first.", domain);
    }

    problems.truncate(MAX_REPORTED_ERRORS);
    anyhow::bail!("No Finance OS session found. Issues: {}", problems.join("; "))
}

/// Problems worth showing; a browser that is simply not installed is not one
fn describe_problem(browser: &str, error: &str) -> Option<String> {
    let lower = error.to_lowercase();
    if lower.contains("lock") || lower.contains("permission") || lower.contains("denied") {
        Some(format!("{}: browser may be locked, try closing it ({})", browser, error))
    } else if lower.contains("decrypt") {
        Some(format!("{}: cookie decryption failed, keychain access may be needed", browser))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, value: &str) -> BrowserCookie {
        BrowserCookie {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn missing(_: Vec<String>) -> Result<Vec<BrowserCookie>, String> {
        Err("No such file or directory (os error 2)".to_string())
    }

    fn locked(_: Vec<String>) -> Result<Vec<BrowserCookie>, String> {
        Err("database is locked".to_string())
    }

    fn csrf_only(_: Vec<String>) -> Result<Vec<BrowserCookie>, String> {
        Ok(vec![cookie("csrftoken", "c")])
    }

    fn logged_in(domains: Vec<String>) -> Result<Vec<BrowserCookie>, String> {
        assert_eq!(domains, vec!["app.datarails.com".to_string()]);
        Ok(vec![cookie("sessionid", "s"), cookie("other", "x"), cookie("csrftoken", "c")])
    }

    #[test]
    fn test_cookie_domain() {
        assert_eq!(cookie_domain("https://dev.datarails.com"), "dev.datarails.com");
        assert_eq!(cookie_domain("https://app.datarails.com/"), "app.datarails.com");
        assert_eq!(cookie_domain("http://127.0.0.1:8000/finance"), "127.0.0.1");
    }

    #[test]
    fn test_session_needs_both_cookies() {
        assert!(session_from_cookies(&[cookie("sessionid", "s")]).is_none());
        assert!(session_from_cookies(&[cookie("sessionid", ""), cookie("csrftoken", "c")]).is_none());

        let session = session_from_cookies(&[cookie("csrftoken", "c"), cookie("sessionid", "s")]).unwrap();
        assert_eq!(session.session_id, "s");
        assert_eq!(session.csrf_token, "c");
    }

    #[test]
    fn test_first_browser_with_a_session_wins() {
        let browsers: Vec<(&str, CookieLoader)> = vec![
            ("Chrome", missing as CookieLoader),
            ("Firefox", csrf_only as CookieLoader),
            ("Edge", logged_in as CookieLoader),
            ("Brave", locked as CookieLoader),
        ];

        let found = find_session("https://app.datarails.com", &browsers).unwrap();
        assert_eq!(found.browser, "Edge");
        assert_eq!(found.session.session_id, "s");
    }

    #[test]
    fn test_missing_session_reports_locked_browsers_only() {
        let browsers: Vec<(&str, CookieLoader)> = vec![("Chrome", missing as CookieLoader), ("Firefox", locked as CookieLoader)];
        let message = find_session("https://app.datarails.com", &browsers).unwrap_err().to_string();
        assert!(message.contains("Firefox: browser may be locked"));
        assert!(!message.contains("Chrome"));

        let browsers: Vec<(&str, CookieLoader)> = vec![("Chrome", missing as CookieLoader), ("Firefox", csrf_only as CookieLoader)];
        let message = find_session("https://app.datarails.com", &browsers).unwrap_err().to_string();
        assert_eq!(message, "No Finance OS session found for app.datarails.com. Please log in first.");
    }
}
