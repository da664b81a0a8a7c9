//! Supabase (PostgREST) implementation of the remote gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{ChangeEvent, RecordFilter, RemoteError, RemoteGateway, RemoteResult, SubscriptionHandle};
use crate::config::RemoteConfig;
use crate::models::{RecordId, RemoteRecord};
use crate::util::{compact_text, now_millis};

const UNIQUE_VIOLATION: &str = "23505";
const UNIQUE_CODE_COLUMN: &str = "unique_code";

/// Remote store backed by a Supabase table.
///
/// Change subscriptions are served by polling the table for rows updated
/// after a cursor; deletions are not observable that way and only reach
/// other devices through a full pass.
pub struct SupabaseGateway {
    rest: RestClient,
    poll_interval: Duration,
    subscriptions: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_subscription: AtomicU64,
}

impl SupabaseGateway {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        config
            .validate()
            .map_err(RemoteError::InvalidConfiguration)?;
        let rest_url = normalize_rest_url(&config.supabase_url)?;
        let anon_key = config.anon_key.trim().to_string();
        let bearer = config
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .unwrap_or(anon_key.as_str())
            .to_string();

        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            rest: RestClient {
                table_url: format!("{rest_url}/{}", config.table.trim()),
                anon_key,
                bearer,
                client,
            },
            poll_interval: config.change_poll_interval(),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    fn subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for SupabaseGateway {
    fn drop(&mut self) {
        for (_, task) in self.subscriptions().drain() {
            task.abort();
        }
    }
}

impl RemoteGateway for SupabaseGateway {
    async fn list_records(&self, filter: &RecordFilter) -> RemoteResult<Vec<RemoteRecord>> {
        self.rest.select(filter_query(filter)).await
    }

    async fn get_record(&self, id: &RecordId) -> RemoteResult<Option<RemoteRecord>> {
        let rows = self
            .rest
            .select(vec![
                ("select".to_string(), "*".to_string()),
                ("id".to_string(), format!("eq.{id}")),
                ("limit".to_string(), "1".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_record(&self, payload: &RemoteRecord) -> RemoteResult<RemoteRecord> {
        let request = self.rest.authorize(
            self.rest
                .client
                .post(&self.rest.table_url)
                .header("Prefer", "return=representation")
                .json(payload),
        );
        let response = send(request).await?;
        let rows = read_rows(response, Some(&payload.unique_code)).await?;
        rows.into_iter().next().ok_or_else(|| RemoteError::Api {
            status: StatusCode::CREATED.as_u16(),
            message: "insert returned no representation".to_string(),
        })
    }

    async fn update_record(
        &self,
        id: &RecordId,
        payload: &RemoteRecord,
    ) -> RemoteResult<RemoteRecord> {
        let request = self.rest.authorize(
            self.rest
                .client
                .patch(&self.rest.table_url)
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation")
                .json(payload),
        );
        let response = send(request).await?;
        let rows = read_rows(response, Some(&payload.unique_code)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn delete_record(&self, id: &RecordId) -> RemoteResult<()> {
        let request = self.rest.authorize(
            self.rest
                .client
                .delete(&self.rest.table_url)
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation"),
        );
        let response = send(request).await?;
        let rows = read_rows(response, None).await?;
        if rows.is_empty() {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        sink: mpsc::UnboundedSender<ChangeEvent>,
    ) -> RemoteResult<SubscriptionHandle> {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(poll_changes(
            self.rest.clone(),
            sink,
            now_millis(),
            self.poll_interval,
        ));
        self.subscriptions().insert(id, task);
        tracing::debug!("Started change subscription {id}");
        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> RemoteResult<()> {
        if let Some(task) = self.subscriptions().remove(&handle.0) {
            task.abort();
            tracing::debug!("Stopped change subscription {}", handle.0);
        }
        Ok(())
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.rest
            .select(vec![
                ("select".to_string(), "id".to_string()),
                ("limit".to_string(), "1".to_string()),
            ])
            .await
            .map(|_| ())
    }
}

#[derive(Clone)]
struct RestClient {
    table_url: String,
    anon_key: String,
    bearer: String,
    client: Client,
}

impl RestClient {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer)
            .header("Accept", "application/json")
    }

    async fn select(&self, query: Vec<(String, String)>) -> RemoteResult<Vec<RemoteRecord>> {
        let request = self.authorize(self.client.get(&self.table_url).query(&query));
        let response = send(request).await?;
        read_rows(response, None).await
    }
}

async fn poll_changes(
    rest: RestClient,
    sink: mpsc::UnboundedSender<ChangeEvent>,
    mut cursor: i64,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if sink.is_closed() {
            break;
        }

        let filter = RecordFilter {
            updated_since: Some(cursor),
            ..RecordFilter::default()
        };
        let rows = match rest.select(filter_query(&filter)).await {
            Ok(rows) => rows,
            Err(error) => {
                tracing::debug!("Change poll failed: {error}");
                continue;
            }
        };

        for row in rows {
            if let Some(updated_at) = row.updated_at {
                cursor = cursor.max(updated_at);
            }
            let event = if row.created_at.is_some() && row.created_at == row.updated_at {
                ChangeEvent::Insert(row)
            } else {
                ChangeEvent::Update(row)
            };
            if sink.send(event).is_err() {
                return;
            }
        }
    }
}

async fn send(request: RequestBuilder) -> RemoteResult<Response> {
    request.send().await.map_err(|error| {
        if error.is_connect() || error.is_timeout() {
            RemoteError::Unavailable(error.to_string())
        } else {
            RemoteError::Http(error)
        }
    })
}

async fn read_rows(response: Response, unique_code: Option<&str>) -> RemoteResult<Vec<RemoteRecord>> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(classify_error(status, &body, unique_code));
    }
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&body)?)
}

fn filter_query(filter: &RecordFilter) -> Vec<(String, String)> {
    let mut query = vec![("select".to_string(), "*".to_string())];
    if let Some(code) = &filter.unique_code {
        query.push(("unique_code".to_string(), format!("eq.{code}")));
    }
    if let Some(site) = &filter.origin_site {
        query.push(("origin_site".to_string(), format!("eq.{site}")));
    }
    if let Some(model) = &filter.model {
        query.push(("model".to_string(), format!("eq.{model}")));
    }
    if let Some(since) = filter.updated_since {
        query.push(("updated_at".to_string(), format!("gt.{since}")));
        query.push(("order".to_string(), "updated_at.asc".to_string()));
    } else {
        query.push(("order".to_string(), "created_at.asc".to_string()));
    }
    query
}

pub(crate) fn normalize_rest_url(url: &str) -> RemoteResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RemoteError::InvalidConfiguration(
            "Supabase URL must not be empty".to_string(),
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(RemoteError::InvalidConfiguration(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn classify_error(status: StatusCode, body: &str, unique_code: Option<&str>) -> RemoteError {
    let payload = serde_json::from_str::<PostgrestError>(body).unwrap_or_default();

    if status == StatusCode::CONFLICT && payload.code.as_deref() == Some(UNIQUE_VIOLATION) {
        let mentions_code = [&payload.message, &payload.details]
            .into_iter()
            .flatten()
            .any(|text| text.contains(UNIQUE_CODE_COLUMN));
        if let (true, Some(unique_code)) = (mentions_code, unique_code) {
            return RemoteError::Conflict {
                unique_code: unique_code.to_string(),
            };
        }
    }

    let message = payload
        .message
        .or(payload.details)
        .or(payload.hint)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            let body = compact_text(body);
            if body.is_empty() {
                status.canonical_reason().unwrap_or("HTTP error").to_string()
            } else {
                body
            }
        });
    RemoteError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_rest_url_appends_rest_path() {
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/rest/v1").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert!(normalize_rest_url("demo.supabase.co").is_err());
    }

    #[test]
    fn unique_code_violation_maps_to_conflict() {
        let body = r#"{
            "code": "23505",
            "details": "Key (unique_code)=(TAB-001) already exists.",
            "hint": null,
            "message": "duplicate key value violates unique constraint \"tablets_unique_code_key\""
        }"#;
        let error = classify_error(StatusCode::CONFLICT, body, Some("TAB-001"));
        assert!(error.is_conflict());
        assert_eq!(
            error.to_string(),
            "Unique code 'TAB-001' already exists remotely"
        );
    }

    #[test]
    fn other_unique_violations_stay_api_errors() {
        let body = r#"{"code":"23505","details":"Key (id)=(x) already exists.","message":"duplicate key value violates unique constraint \"tablets_pkey\""}"#;
        let error = classify_error(StatusCode::CONFLICT, body, Some("TAB-001"));
        assert!(!error.is_conflict());
        assert!(matches!(error, RemoteError::Api { status: 409, .. }));
    }

    #[test]
    fn server_errors_are_unavailable() {
        let error = classify_error(StatusCode::BAD_GATEWAY, "", None);
        assert!(error.is_unavailable());
        assert_eq!(error.to_string(), "Remote API error: Bad Gateway (502)");
    }

    #[test]
    fn filter_query_uses_postgrest_operators() {
        let filter = RecordFilter {
            unique_code: Some("TAB-001".to_string()),
            updated_since: Some(42),
            ..RecordFilter::default()
        };
        let query = filter_query(&filter);
        assert!(query.contains(&("unique_code".to_string(), "eq.TAB-001".to_string())));
        assert!(query.contains(&("updated_at".to_string(), "gt.42".to_string())));
        assert!(query.contains(&("order".to_string(), "updated_at.asc".to_string())));
    }

    #[test]
    fn gateway_rejects_invalid_config() {
        let config = RemoteConfig::new("ftp://demo", "anon");
        assert!(matches!(
            SupabaseGateway::new(&config),
            Err(RemoteError::InvalidConfiguration(_))
        ));
    }
}
