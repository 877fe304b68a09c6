//! Google Sheets sink using a service account.
//!
//! Authentication follows the OAuth 2.0 JWT bearer flow: a JWT signed with the
//! service account's RSA key is exchanged for a short-lived access token, which
//! is cached until shortly before it expires. Rows are appended with the
//! `values:append` endpoint. The first append to a target creates the worksheet
//! when it does not exist yet and writes a header row into an empty one.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::RwLock;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use tokio::sync::Mutex;
use url::Url;

use super::{SheetSink, SinkError};
use crate::core::config::SinkConfig;
use crate::core::sample::SheetRow;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    properties: SheetProperties,
    #[serde(default)]
    sheets: Vec<Worksheet>,
}

#[derive(Debug, Deserialize)]
struct Worksheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

/// Connection state guarded by one async lock so token refreshes never race
#[derive(Debug, Default)]
struct Session {
    credentials_ref: String,
    token: Option<AccessToken>,
    /// (spreadsheet id, worksheet) already checked for existence
    prepared: Option<(String, String)>,
}

impl Session {
    fn sync_with(&mut self, target: &SinkConfig) {
        if self.credentials_ref != target.credentials_ref {
            self.credentials_ref = target.credentials_ref.clone();
            self.token = None;
            self.prepared = None;
        }
    }
}

/// Spreadsheet summary returned by [`GoogleSheetsSink::check`]
#[derive(Debug, Clone, Serialize)]
pub struct SheetInfo {
    pub spreadsheet_id: String,
    pub title: String,
    pub worksheets: Vec<String>,
    pub worksheet_present: bool,
}

/// Appends rows to a Google Sheets worksheet
pub struct GoogleSheetsSink {
    client: reqwest::Client,
    api_base: String,
    target: RwLock<SinkConfig>,
    session: Mutex<Session>,
}

impl GoogleSheetsSink {
    pub fn new(config: SinkConfig) -> Self {
        log::info!(
            "Google Sheets sink for spreadsheet {} / worksheet {:?}",
            spreadsheet_id(&config.destination_id),
            config.worksheet_name
        );
        Self {
            client: reqwest::Client::new(),
            api_base: SHEETS_API.to_string(),
            target: RwLock::new(config),
            session: Mutex::new(Session::default()),
        }
    }

    /// Send spreadsheet requests to `base` instead of the public Sheets API
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Authenticate and read the spreadsheet's title and worksheets
    pub async fn check(&self) -> crate::Result<SheetInfo> {
        let target = self.target.read().clone();
        let mut session = self.session.lock().await;
        session.sync_with(&target);

        let id = spreadsheet_id(&target.destination_id).to_string();
        let meta = self.fetch_meta(&mut session, &id).await?;

        let worksheets: Vec<String> = meta.sheets.into_iter().map(|s| s.properties.title).collect();
        let worksheet_present = worksheets.contains(&target.worksheet_name);

        Ok(SheetInfo {
            spreadsheet_id: id,
            title: meta.properties.title,
            worksheets,
            worksheet_present,
        })
    }

    async fn access_token(&self, session: &mut Session) -> Result<String, SinkError> {
        if let Some(token) = &session.token {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let key = load_key(&session.credentials_ref)?;
        let now = Utc::now();
        let claims = Claims {
            iss: &key.client_email,
            scope: SCOPE,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_LIFETIME_SECS,
        };
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SinkError::fatal(format!("Invalid service account key: {}", e)))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| SinkError::fatal(format!("Failed to sign token request: {}", e)))?;

        log::debug!("Requesting access token for {}", key.client_email);
        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(classify_transport)?;
        // The token exchange has no side effects, so nothing can be half-applied
        let response = check_status(response).await.map_err(|e| match e {
            SinkError::Transient { message, .. } => SinkError::transient(message, false),
            fatal => fatal,
        })?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SinkError::transient(format!("Malformed token response: {}", e), false))?;

        let access = AccessToken {
            value: token.access_token,
            expires_at: now + ChronoDuration::seconds(token.expires_in),
        };
        let value = access.value.clone();
        session.token = Some(access);
        Ok(value)
    }

    /// Send the request built by `build`, refreshing the token once if it is rejected
    async fn send_authorized<F>(&self, session: &mut Session, build: F) -> Result<Response, SinkError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token(session).await?;
        let response = build(&token).send().await.map_err(classify_transport)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        // Token revoked or expired early; one fresh token, then give up
        log::info!("Access token rejected, refreshing");
        session.token = None;
        let token = self.access_token(session).await?;
        let response = build(&token).send().await.map_err(classify_transport)?;
        check_status(response).await
    }

    async fn fetch_meta(&self, session: &mut Session, id: &str) -> Result<SpreadsheetMeta, SinkError> {
        let url = self.sheets_url(&[id])?;
        let response = self
            .send_authorized(session, |token| {
                self.client
                    .get(url.clone())
                    .bearer_auth(token)
                    .query(&[("fields", "properties.title,sheets.properties.title")])
            })
            .await?;

        response
            .json()
            .await
            .map_err(|e| SinkError::transient(format!("Malformed spreadsheet metadata: {}", e), false))
    }

    /// Whether the worksheet has nothing in its first row
    async fn is_blank(&self, session: &mut Session, id: &str, worksheet: &str) -> Result<bool, SinkError> {
        let range = format!("{}!1:1", quote_sheet_name(worksheet));
        let url = self.sheets_url(&[id, "values", &range])?;
        let response = self
            .send_authorized(session, |token| self.client.get(url.clone()).bearer_auth(token))
            .await?;

        let first_row: ValueRange = response
            .json()
            .await
            .map_err(|e| SinkError::transient(format!("Malformed value range: {}", e), false))?;
        Ok(first_row.values.iter().all(|row| row.is_empty()))
    }

    /// Make sure the worksheet exists and starts with a header row
    async fn ensure_worksheet(&self, session: &mut Session, id: &str, worksheet: &str) -> Result<(), SinkError> {
        let meta = self.fetch_meta(session, id).await?;

        if meta.sheets.iter().any(|s| s.properties.title == worksheet) {
            if !self.is_blank(session, id, worksheet).await? {
                log::debug!("Found existing worksheet {:?}", worksheet);
                return Ok(());
            }
            log::info!("Worksheet {:?} is empty, writing header row", worksheet);
        } else {
            log::info!("Creating worksheet {:?} in {:?}", worksheet, meta.properties.title);
            let url = self.sheets_url(&[&format!("{}:batchUpdate", id)])?;
            let body = json!({
                "requests": [{ "addSheet": { "properties": { "title": worksheet } } }]
            });
            self.send_authorized(session, |token| {
                self.client.post(url.clone()).bearer_auth(token).json(&body)
            })
            .await?;
        }

        self.post_rows(session, id, worksheet, &[SheetRow::header_values()])
            .await
    }

    async fn post_rows(
        &self,
        session: &mut Session,
        id: &str,
        worksheet: &str,
        values: &[Vec<Value>],
    ) -> Result<(), SinkError> {
        let range = format!("{}!A1:append", quote_sheet_name(worksheet));
        let url = self.sheets_url(&[id, "values", &range])?;
        let body = json!({ "values": values });

        self.send_authorized(session, |token| {
            self.client
                .post(url.clone())
                .bearer_auth(token)
                .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                .json(&body)
        })
        .await?;
        Ok(())
    }

    fn sheets_url(&self, segments: &[&str]) -> Result<Url, SinkError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SinkError::fatal(format!("Invalid Sheets API URL {:?}: {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::fatal("Sheets API URL cannot take path segments"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl SheetSink for GoogleSheetsSink {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn append(&self, rows: &[SheetRow]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let target = self.target.read().clone();
        let mut session = self.session.lock().await;
        session.sync_with(&target);

        let id = spreadsheet_id(&target.destination_id).to_string();
        let prepared_key = (id.clone(), target.worksheet_name.clone());

        if session.prepared.as_ref() != Some(&prepared_key) {
            self.ensure_worksheet(&mut session, &id, &target.worksheet_name)
                .await?;
            session.prepared = Some(prepared_key);
        }

        let values: Vec<Vec<Value>> = rows.iter().map(|row| row.values.clone()).collect();
        self.post_rows(&mut session, &id, &target.worksheet_name, &values)
            .await?;

        log::debug!("Appended {} rows to {:?}", rows.len(), target.worksheet_name);
        Ok(())
    }

    fn reconfigure(&self, config: &SinkConfig) {
        let mut target = self.target.write();
        if *target != *config {
            log::info!(
                "Sink retargeted to spreadsheet {} / worksheet {:?}",
                spreadsheet_id(&config.destination_id),
                config.worksheet_name
            );
            *target = config.clone();
        }
    }
}

fn load_key(path: &str) -> Result<ServiceAccountKey, SinkError> {
    let data = fs::read_to_string(path)
        .map_err(|e| SinkError::fatal(format!("Cannot read credentials {:?}: {}", path, e)))?;
    serde_json::from_str(&data)
        .map_err(|e| SinkError::fatal(format!("Invalid credentials file {:?}: {}", path, e)))
}


/// Extract the spreadsheet id from either a bare id or a spreadsheet URL
pub fn spreadsheet_id(destination: &str) -> &str {
    let destination = destination.trim();
    match destination.find("/d/") {
        Some(idx) => destination[idx + 3..]
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(destination),
        None => destination,
    }
}

/// Quote a worksheet name for A1 notation
fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

async fn check_status(response: Response) -> Result<Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &str) -> SinkError {
    let mut body = body.trim().to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    let message = format!("HTTP {}: {}", status.as_u16(), body);

    match status.as_u16() {
        408 | 429 => SinkError::transient(message, false),
        500..=599 => SinkError::transient(message, true),
        _ => SinkError::fatal(message),
    }
}

fn classify_transport(err: reqwest::Error) -> SinkError {
    if err.is_builder() {
        SinkError::fatal(format!("Invalid request: {}", err))
    } else if err.is_connect() {
        SinkError::transient(format!("Connection failed: {}", err), false)
    } else {
        // Timeouts and broken responses: the request may have landed
        SinkError::transient(format!("Request failed: {}", err), true)
    }
}
