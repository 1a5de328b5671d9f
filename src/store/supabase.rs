//! Client for the hosted backend: PostgREST tables under `/rest/v1` and the
//! storage API under `/storage/v1`.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::models::{AnimalRecord, NewFootprint};
use crate::store::{AnimalCatalog, FootprintLedger, ObjectEntry, ObjectStore, StoreError, StoreResult};

pub const ANIMALS_TABLE: &str = "Animaux";
pub const FOOTPRINTS_TABLE: &str = "Empreintes";
const SPECIES_COLUMN: &str = "Espèce";
const LIST_PAGE_SIZE: u32 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Row shape of the species table as the backend returns it.
#[derive(Debug, Deserialize)]
struct AnimalRow {
    id: i64,
    #[serde(rename = "Espèce")]
    species: String,
    #[serde(rename = "Card", default)]
    card: Option<String>,
    #[serde(rename = "Fun fact", default)]
    fun_fact: Option<String>,
}

impl From<AnimalRow> for AnimalRecord {
    fn from(row: AnimalRow) -> Self {
        AnimalRecord {
            id: row.id,
            species: row.species,
            card_url: row.card.unwrap_or_default(),
            fun_fact: row.fun_fact.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FootprintRow<'a> {
    animal_id: i64,
    image_url: &'a str,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    id: Option<String>,
}

/// Handle to one backend project. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    base_url_str: String,
}

impl SupabaseClient {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let base_url_str = config.base_url.trim_end_matches('/').to_string();
        let base_url = Url::parse(&base_url_str)
            .map_err(|e| StoreError::Network(format!("invalid store URL '{}': {}", base_url_str, e)))?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| StoreError::Network(format!("invalid store key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| StoreError::Network(format!("invalid store key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url,
            base_url_str,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Network(format!("store URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')));
        Ok(url)
    }

    fn table(&self, table: &str) -> StoreResult<RequestBuilder> {
        Ok(self.http.get(self.endpoint(&["rest", "v1", table])?))
    }

    async fn select_animal(&self, filter: Option<&str>) -> StoreResult<Option<AnimalRecord>> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string()), ("limit", "1".to_string())];
        if let Some(species) = filter {
            query.push((SPECIES_COLUMN, format!("eq.{}", species)));
        }
        let response = self.table(ANIMALS_TABLE)?.query(&query).send().await?;
        let rows: Vec<AnimalRow> = check(response).await?.json().await?;
        Ok(rows.into_iter().next().map(AnimalRecord::from))
    }
}

/// Turn a non-2xx response into `StoreError::Status`.
async fn check(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 404 {
        return Err(StoreError::NotFound(body));
    }
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

impl AnimalCatalog for SupabaseClient {
    async fn find_by_species(&self, species: &str) -> StoreResult<Option<AnimalRecord>> {
        tracing::debug!(species, "looking up species");
        self.select_animal(Some(species)).await
    }

    async fn any_animal(&self) -> StoreResult<Option<AnimalRecord>> {
        self.select_animal(None).await
    }
}

impl FootprintLedger for SupabaseClient {
    async fn insert_footprint(&self, footprint: &NewFootprint) -> StoreResult<()> {
        let row = FootprintRow {
            animal_id: footprint.animal_id,
            image_url: &footprint.image_url,
        };
        let response = self
            .http
            .post(self.endpoint(&["rest", "v1", FOOTPRINTS_TABLE])?)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

impl ObjectStore for SupabaseClient {
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let url = self.endpoint(&["storage", "v1", "object", "list", bucket])?;
        let listed = collect_pages(LIST_PAGE_SIZE, |offset| {
            let request = self.http.post(url.clone()).json(&ListRequest {
                prefix,
                limit: LIST_PAGE_SIZE,
                offset,
            });
            async move {
                let page: Vec<ListedObject> = check(request.send().await?).await?.json().await?;
                Ok(page)
            }
        })
        .await?;
        Ok(listed
            .into_iter()
            .map(|o| ObjectEntry {
                is_folder: o.id.is_none(),
                name: o.name,
            })
            .collect())
    }

    async fn download(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let response = self
            .http
            .get(self.endpoint(&["storage", "v1", "object", bucket, key])?)
            .send()
            .await?;
        let bytes = check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        let response = self
            .http
            .post(self.endpoint(&["storage", "v1", "object", bucket, key])?)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url_str, bucket, key)
    }
}

/// Fetch `page_size` items at increasing offsets until a short page comes back.
async fn collect_pages<T, F, Fut>(page_size: u32, mut fetch: F) -> StoreResult<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StoreResult<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetch(offset).await?;
        let count = page.len();
        items.extend(page);
        if count < page_size as usize {
            return Ok(items);
        }
        offset += page_size;
    }
}
