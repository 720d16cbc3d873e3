//! Request/response client for the hosted store.
//!
//! Three surfaces are consumed: the relational API under `/rest/v1`, object
//! storage under `/storage/v1` and the auth user endpoint under `/auth/v1`.
//! Every call resolves to the decoded rows or a [`StoreError`] carrying the
//! platform's message.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::StoreError;

#[derive(Clone, Debug)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(crate::config::store_url()?, crate::config::store_key()?))
    }

    /// A client acting on behalf of the holder of `token`. Shares the
    /// connection pool with `self`.
    pub fn with_token(&self, token: Option<&str>) -> Self {
        Self {
            access_token: token.map(str::to_string),
            ..self.clone()
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn relation(&self, name: &str) -> Query {
        Query {
            client: self.clone(),
            relation: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn bucket(&self, name: &str) -> Bucket {
        Bucket {
            client: self.clone(),
            name: name.to_string(),
        }
    }

    /// The user owning the current access token, `None` when anonymous or
    /// when the token is rejected.
    pub async fn current_user(&self) -> Result<Option<AuthUser>, StoreError> {
        if self.access_token.is_none() {
            return Ok(None);
        }

        let url = format!("{}/auth/v1/user", self.base_url);
        let resp = self.authorize(self.http.get(&url)).send().await?;
        if matches!(resp.status().as_u16(), 401 | 403) {
            return Ok(None);
        }

        let resp = check(resp).await?;
        let user = resp.json::<AuthUser>().await.map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(user))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }
}

/// A pending request against one relation. Filters accumulate until one of
/// the terminal async methods sends it.
#[derive(Debug)]
pub struct Query {
    client: StoreClient,
    relation: String,
    params: Vec<(String, String)>,
}

impl Query {
    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params.push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    pub fn is_in<V: ToString>(mut self, column: &str, values: &[V]) -> Self {
        let joined = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
        self.params.push((column.to_string(), format!("in.({})", joined)));
        self
    }

    /// Raw disjunction, e.g. `and(sender_id.eq.a,receiver_id.eq.b),...`.
    pub fn or(mut self, expression: &str) -> Self {
        self.params.push(("or".to_string(), format!("({})", expression)));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params.push(("order".to_string(), format!("{}.{}", column, direction)));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, StoreError> {
        debug!(relation = %self.relation, "select");
        let resp = self.request(reqwest::Method::GET).send().await?;
        decode(check(resp).await?).await
    }

    /// Fetch exactly one row; the store answers 406 when zero or several match.
    pub async fn single<T: DeserializeOwned>(self) -> Result<T, StoreError> {
        debug!(relation = %self.relation, "select single");
        let resp = self
            .request(reqwest::Method::GET)
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;
        decode(check(resp).await?).await
    }

    pub async fn insert<B, T>(self, body: &B) -> Result<Vec<T>, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(relation = %self.relation, "insert");
        let resp = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        decode(check(resp).await?).await
    }

    pub async fn insert_quiet<B: Serialize + ?Sized>(self, body: &B) -> Result<(), StoreError> {
        debug!(relation = %self.relation, "insert");
        let resp = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    pub async fn update<B: Serialize + ?Sized>(self, body: &B) -> Result<(), StoreError> {
        debug!(relation = %self.relation, "update");
        let resp = self
            .request(reqwest::Method::PATCH)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    pub async fn delete(self) -> Result<(), StoreError> {
        debug!(relation = %self.relation, "delete");
        let resp = self.request(reqwest::Method::DELETE).send().await?;
        check(resp).await.map(|_| ())
    }

    fn request(&self, method: reqwest::Method) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.client.base_url, self.relation);
        self.client
            .authorize(self.client.http.request(method, &url))
            .query(&self.params)
    }
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug)]
pub struct Bucket {
    client: StoreClient,
    name: String,
}

impl Bucket {
    pub async fn download(&self, path: &str) -> Result<Blob, StoreError> {
        let encoded = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = format!("{}/storage/v1/object/{}/{}", self.client.base_url, self.name, encoded);
        debug!(bucket = %self.name, path, "download");

        let resp = self.client.authorize(self.client.http.get(&url)).send().await?;
        let resp = check(resp).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();

        Ok(Blob { bytes, content_type })
    }
}

async fn check(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });

    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_render_as_postgrest_params() {
        let client = StoreClient::new("http://localhost:54321/", "anon");
        let query = client
            .relation("friends")
            .select("*")
            .eq("sender_id", "a")
            .is_in("band_id", &[1, 2])
            .order("date_start", false);

        assert_eq!(
            query.params(),
            &[
                ("select".to_string(), "*".to_string()),
                ("sender_id".to_string(), "eq.a".to_string()),
                ("band_id".to_string(), "in.(1,2)".to_string()),
                ("order".to_string(), "date_start.desc".to_string()),
            ]
        );
    }

    #[test]
    fn token_is_scoped_to_the_derived_client() {
        let client = StoreClient::new("http://localhost", "anon");
        let scoped = client.with_token(Some("jwt"));
        assert_eq!(scoped.access_token(), Some("jwt"));
        assert_eq!(client.access_token(), None);
    }
}
