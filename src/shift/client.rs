use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, redirect, Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{RedemptionClient, Status};
use crate::models::{Game, Platform};
use crate::normalization::game::resolve_game;
use crate::util::html::{html_unescape, strip_tags};

pub const SHIFT_BASE_URL: &str = "https://shift.gearboxsoftware.com";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const STATUS_POLL_ATTEMPTS: usize = 10;
const STATUS_POLL_DELAY: Duration = Duration::from_millis(750);

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Authenticated session against the SHiFT website.
///
/// Built once per process and shared by reference across scheduled runs; the
/// cookie jar inside the `reqwest::Client` carries the login.
pub struct ShiftClient {
    http: Client,
    base_url: String,
    user: String,
    password: String,
    logged_in: tokio::sync::Mutex<bool>,
    last_status: Mutex<Option<Status>>,
}

/// One "Redeem for <platform>" form from the entitlement lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionForm {
    /// Heading the form sits under (the game title).
    pub title: String,
    pub service: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct RedemptionStatusBody {
    #[serde(default)]
    in_progress: bool,
    #[serde(default)]
    text: Option<String>,
}

impl ShiftClient {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()
            .context("building SHiFT http client")?;
        Ok(Self {
            http,
            base_url: SHIFT_BASE_URL.to_string(),
            user: user.into(),
            password: password.into(),
            logged_in: tokio::sync::Mutex::new(false),
            last_status: Mutex::new(None),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn csrf_token(&self, path: &str) -> Result<String> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        if resp.status().is_redirection() {
            bail!("GET {path} redirected to {}; session is not authenticated", location(&resp).unwrap_or_default());
        }
        let html = resp.text().await?;
        extract_csrf_token(&html).ok_or_else(|| anyhow!("no csrf token on {path}"))
    }

    async fn login(&self) -> Result<()> {
        info!(user = %self.user, "logging in to SHiFT");
        let token = self.csrf_token("/home").await?;
        let form = [
            ("authenticity_token", token.as_str()),
            ("user[email]", self.user.as_str()),
            ("user[password]", self.password.as_str()),
        ];
        let resp = self
            .http
            .post(self.url("/sessions"))
            .header(header::REFERER, self.url("/home"))
            .form(&form)
            .send()
            .await
            .context("POST /sessions")?;
        let status = resp.status();
        let target = location(&resp).unwrap_or_default();
        if !status.is_redirection() || target.contains("/home") {
            bail!("SHiFT login failed (status {status}); check SHIFT_USER / SHIFT_PASS");
        }
        info!("login successful");
        Ok(())
    }

    async fn redeem_inner(&self, code: &str, game: Game, platform: Platform) -> Result<Status> {
        let token = match self.csrf_token("/rewards").await {
            Ok(t) => t,
            Err(err) => {
                // the session cookie expired between scheduled runs
                warn!(error = %err, "rewards page unavailable; logging in again");
                *self.logged_in.lock().await = false;
                self.ensure_session().await?;
                self.csrf_token("/rewards").await?
            }
        };

        let resp = self
            .http
            .get(self.url("/entitlement_offer_codes"))
            .query(&[("code", code)])
            .header("x-csrf-token", token.as_str())
            .header("x-requested-with", "XMLHttpRequest")
            .header(header::REFERER, self.url("/rewards"))
            .send()
            .await
            .context("GET /entitlement_offer_codes")?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Status::SlowDown);
        }
        let http_status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !http_status.is_success() {
            return Ok(Status::Unknown(format!(
                "entitlement lookup returned {http_status}: {}",
                truncate_for_log(body, 200)
            )));
        }

        let forms = parse_redemption_forms(&body);
        if forms.is_empty() {
            return Ok(classify_text(&body)
                .unwrap_or_else(|| Status::Unknown(truncate_for_log(strip_tags(&body), 200))));
        }
        let Some(form) = forms
            .into_iter()
            .find(|f| f.service == platform.id() && resolve_game(&f.title) == Some(game))
        else {
            debug!(%code, %game, %platform, "no redemption form for this game/platform");
            return Ok(Status::Invalid);
        };

        self.submit_form(&form).await
    }

    async fn submit_form(&self, form: &RedemptionForm) -> Result<Status> {
        let resp = self
            .http
            .post(self.url("/code_redemptions"))
            .header(header::REFERER, self.url("/new_code_redemption"))
            .form(&form.fields)
            .send()
            .await
            .context("POST /code_redemptions")?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Status::SlowDown);
        }
        let Some(mut target) = location(&resp) else {
            let body = resp.text().await.unwrap_or_default();
            return Ok(classify_text(&body)
                .unwrap_or_else(|| Status::Unknown(truncate_for_log(strip_tags(&body), 200))));
        };

        if target.contains("/code_redemptions/") {
            let status_url = self.absolute(&target);
            for _ in 0..STATUS_POLL_ATTEMPTS {
                let poll = self
                    .http
                    .get(&status_url)
                    .header(header::ACCEPT, "application/json")
                    .send()
                    .await
                    .context("polling redemption status")?;
                if let Some(next) = location(&poll) {
                    target = next;
                    break;
                }
                let body: RedemptionStatusBody = match poll.json().await {
                    Ok(b) => b,
                    Err(_) => break,
                };
                if !body.in_progress {
                    if let Some(status) = body.text.as_deref().and_then(classify_text) {
                        return Ok(status);
                    }
                    break;
                }
                tokio::time::sleep(STATUS_POLL_DELAY).await;
            }
        }

        let page = self
            .http
            .get(self.absolute(&target))
            .send()
            .await
            .context("reading redemption result")?
            .text()
            .await?;
        let notice = extract_flash_notice(&page).unwrap_or_else(|| strip_tags(&page));
        Ok(classify_text(&notice).unwrap_or_else(|| Status::Unknown(truncate_for_log(notice, 200))))
    }

    fn absolute(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            self.url(target)
        }
    }
}

#[async_trait]
impl RedemptionClient for ShiftClient {
    async fn ensure_session(&self) -> Result<()> {
        let mut logged_in = self.logged_in.lock().await;
        if !*logged_in {
            self.login().await?;
            *logged_in = true;
        }
        Ok(())
    }

    async fn redeem(&self, code: &str, game: Game, platform: Platform) -> Result<Status> {
        self.ensure_session().await?;
        let status = self.redeem_inner(code, game, platform).await?;
        if let Ok(mut last) = self.last_status.lock() {
            *last = Some(status.clone());
        }
        Ok(status)
    }

    fn last_status(&self) -> Option<Status> {
        self.last_status.lock().ok().and_then(|s| s.clone())
    }
}

fn location(resp: &Response) -> Option<String> {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static SHiFT page pattern is valid"))
}

/// Map a message from the SHiFT website to a status. `None` when unrecognized.
pub fn classify_text(text: &str) -> Option<Status> {
    let t = text.to_ascii_lowercase();
    if t.contains("successfully redeemed") {
        Some(Status::Success)
    } else if t.contains("already been redeemed") || t.contains("already redeemed") {
        Some(Status::Redeemed)
    } else if t.contains("has expired") || t.contains("code expired") {
        Some(Status::Expired)
    } else if t.contains("launch a shift-enabled title") || t.contains("try again later") {
        Some(Status::TryLater)
    } else if t.contains("too many requests") || t.contains("slow down") {
        Some(Status::SlowDown)
    } else if t.contains("does not exist")
        || t.contains("not a valid")
        || t.contains("not available for your account")
    {
        Some(Status::Invalid)
    } else {
        None
    }
}

pub fn extract_csrf_token(html: &str) -> Option<String> {
    static META: OnceLock<Regex> = OnceLock::new();
    static INPUT: OnceLock<Regex> = OnceLock::new();
    let meta = regex(&META, r#"<meta[^>]*name="csrf-token"[^>]*content="([^"]+)""#);
    let input = regex(&INPUT, r#"<input[^>]*name="authenticity_token"[^>]*value="([^"]+)""#);
    meta.captures(html)
        .or_else(|| input.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| html_unescape(m.as_str()))
}

/// Collect every `/code_redemptions` form with the heading it appears under.
pub fn parse_redemption_forms(html: &str) -> Vec<RedemptionForm> {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static INPUT_TAG: OnceLock<Regex> = OnceLock::new();
    static NAME: OnceLock<Regex> = OnceLock::new();
    static VALUE: OnceLock<Regex> = OnceLock::new();
    let blocks = regex(
        &BLOCKS,
        r#"(?s)<h2[^>]*>(.*?)</h2>|<form[^>]*action="[^"]*/code_redemptions"[^>]*>(.*?)</form>"#,
    );
    let input_tag = regex(&INPUT_TAG, r#"<input[^>]*>"#);
    let name_re = regex(&NAME, r#"name="([^"]*)""#);
    let value_re = regex(&VALUE, r#"value="([^"]*)""#);

    let mut heading = String::new();
    let mut forms = Vec::new();
    for cap in blocks.captures_iter(html) {
        if let Some(h) = cap.get(1) {
            heading = html_unescape(strip_tags(h.as_str()).trim());
            continue;
        }
        let Some(inner) = cap.get(2) else { continue };
        let mut fields = Vec::new();
        for tag in input_tag.find_iter(inner.as_str()) {
            let tag = tag.as_str();
            if tag.contains(r#"type="submit""#) {
                continue;
            }
            let Some(name) = name_re.captures(tag).and_then(|c| c.get(1)) else {
                continue;
            };
            let value = value_re
                .captures(tag)
                .and_then(|c| c.get(1))
                .map(|m| html_unescape(m.as_str()))
                .unwrap_or_default();
            fields.push((html_unescape(name.as_str()), value));
        }
        let service = fields
            .iter()
            .find(|(k, _)| k.ends_with("[service]"))
            .map(|(_, v)| v.to_ascii_lowercase())
            .unwrap_or_default();
        forms.push(RedemptionForm {
            title: heading.clone(),
            service,
            fields,
        });
    }
    forms
}

fn extract_flash_notice(html: &str) -> Option<String> {
    static NOTICE: OnceLock<Regex> = OnceLock::new();
    let notice = regex(
        &NOTICE,
        r#"(?s)<div[^>]*class="[^"]*(?:alert|notice)[^"]*"[^>]*>(.*?)</div>"#,
    );
    notice
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| html_unescape(strip_tags(m.as_str()).trim()))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTITLEMENT_HTML: &str = r#"
        <h2>Borderlands 3</h2>
        <form class="new_archway_code_redemption" action="/code_redemptions" method="post">
          <input type="hidden" name="authenticity_token" value="tok&amp;en" />
          <input type="hidden" name="archway_code_redemption[code]" value="AAAAA-BBBBB" />
          <input type="hidden" name="archway_code_redemption[check]" value="chk" />
          <input type="hidden" name="archway_code_redemption[service]" value="steam" />
          <input type="submit" name="commit" value="Redeem for Steam" />
        </form>
        <form class="new_archway_code_redemption" action="/code_redemptions" method="post">
          <input type="hidden" name="archway_code_redemption[service]" value="epic" />
        </form>
        <h2>Borderlands 2</h2>
        <form action="/code_redemptions" method="post">
          <input type="hidden" name="archway_code_redemption[service]" value="steam" />
        </form>
    "#;

    #[test]
    fn parses_forms_under_their_headings() {
        let forms = parse_redemption_forms(ENTITLEMENT_HTML);
        assert_eq!(forms.len(), 3);
        assert_eq!(forms[0].title, "Borderlands 3");
        assert_eq!(forms[0].service, "steam");
        assert_eq!(forms[0].fields.len(), 4);
        assert!(forms[0]
            .fields
            .contains(&("authenticity_token".to_string(), "tok&en".to_string())));
        assert_eq!(forms[1].service, "epic");
        assert_eq!(forms[2].title, "Borderlands 2");
    }

    #[test]
    fn extracts_csrf_token_from_meta() {
        let html = r#"<head><meta name="csrf-token" content="abc123=="></head>"#;
        assert_eq!(extract_csrf_token(html).as_deref(), Some("abc123=="));
        assert_eq!(extract_csrf_token("<html></html>"), None);
    }

    #[test]
    fn classifies_service_messages() {
        assert_eq!(
            classify_text("Your code was successfully redeemed"),
            Some(Status::Success)
        );
        assert_eq!(
            classify_text("This SHiFT code has already been redeemed"),
            Some(Status::Redeemed)
        );
        assert_eq!(classify_text("This SHiFT code has expired"), Some(Status::Expired));
        assert_eq!(
            classify_text("To continue to redeem SHiFT codes, please launch a SHiFT-enabled title first!"),
            Some(Status::TryLater)
        );
        assert_eq!(classify_text("This SHiFT code does not exist"), Some(Status::Invalid));
        assert_eq!(classify_text("Welcome back"), None);
    }

    #[test]
    fn flash_notice_is_preferred_over_page_text() {
        let html = r#"<body><div class="alert notice"><p>Your code was successfully redeemed</p></div><p>other</p></body>"#;
        assert_eq!(
            extract_flash_notice(html).as_deref(),
            Some("Your code was successfully redeemed")
        );
    }
}
