//! Firestore REST implementation of the document store.
//!
//! Every trait call is one blocking HTTP request:
//!
//! | operation   | request                                                  |
//! |-------------|----------------------------------------------------------|
//! | `get`       | `GET  v1/<document>`                                     |
//! | `list_page` | `GET  v1/<collection>?pageSize=..&pageToken=..`          |
//! | `query_eq`  | `POST v1/<parent document>:runQuery`                     |
//! | `set`, `create`, `commit` | `POST v1/<database>/documents:commit`      |

use pseudotable_core::{
    CollectionPath, CreateOutcome, Document, DocumentPath, DocumentStore, Fields, Page, TableError,
    TableResult, Write, DEFAULT_MAX_BATCH_SIZE,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as Json};
use tracing::{debug, info};
use url::Url;

use crate::config::FirestoreConfig;
use crate::error::FirestoreError;
use crate::value::{encode_eq_query, encode_write, ListResponse, QueryResult, RawDocument};

/// Token the emulator accepts as an administrator, bypassing security rules.
const EMULATOR_TOKEN: &str = "owner";

/// A connection to one Firestore database.
pub struct FirestoreStore {
    agent: ureq::Agent,
    base: Url,
    project_id: String,
    /// `projects/<project>/databases/<database>`
    database: String,
    token: Option<String>,
}

impl FirestoreStore {
    /// Resolve credentials and build the HTTP agent.
    ///
    /// No request is made until the first store call.
    pub fn connect(config: &FirestoreConfig) -> Result<Self, FirestoreError> {
        config.validate().map_err(FirestoreError::Config)?;

        let key = config.credentials.as_ref().map(|c| c.resolve()).transpose()?;
        let project_id = match (&config.project_id, &key) {
            (Some(project), _) => project.clone(),
            (None, Some(key)) => key.project_id.clone(),
            (None, None) => return Err(FirestoreError::Config("no project id".to_string())),
        };

        let host = config.host_url();
        let base = Url::parse(&host)
            .map_err(|err| FirestoreError::Config(format!("bad host {:?}: {}", host, err)))?;
        if base.cannot_be_a_base() {
            return Err(FirestoreError::Config(format!("bad host {:?}", host)));
        }

        let token = match (&config.access_token, &config.emulator_host) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(_)) => Some(EMULATOR_TOKEN.to_string()),
            (None, None) => None,
        };

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.request_timeout)
            .timeout_write(config.request_timeout)
            .build();

        info!(
            project = %project_id,
            database = %config.database,
            host = %base,
            account = key.as_ref().and_then(|k| k.client_email.as_deref()).unwrap_or("-"),
            "connected to firestore"
        );

        Ok(Self {
            agent,
            base,
            database: format!("projects/{}/databases/{}", project_id, config.database),
            project_id,
            token,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Resource name of a document.
    pub fn document_name(&self, path: &DocumentPath) -> String {
        format!("{}/documents/{}", self.database, path)
    }

    /// Resource name of the document owning `collection`, or the database
    /// documents root for a top-level collection.
    fn parent_name(&self, collection: &CollectionPath) -> String {
        let parent = collection.parent_segments();
        if parent.is_empty() {
            format!("{}/documents", self.database)
        } else {
            format!("{}/documents/{}", self.database, parent.join("/"))
        }
    }

    /// `v1/<name>` with an optional `:<method>` suffix on the last segment.
    ///
    /// Segments are percent-encoded individually, so data with spaces or
    /// `+` survive the trip.
    pub(crate) fn resource_url(
        &self,
        name: &str,
        method: Option<&str>,
    ) -> Result<Url, FirestoreError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FirestoreError::Config(format!("bad host {}", self.base)))?;
            segments.clear().push("v1");
            let mut parts = name.split('/').peekable();
            while let Some(part) = parts.next() {
                match (parts.peek(), method) {
                    (None, Some(method)) => segments.push(&format!("{}:{}", part, method)),
                    _ => segments.push(part),
                };
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        let request = request.set("accept", "application/json");
        match &self.token {
            Some(token) => request.set("authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }

    fn send(
        &self,
        operation: &'static str,
        path: &str,
        request: ureq::Request,
        body: Option<&Json>,
    ) -> Result<ureq::Response, FirestoreError> {
        let request = self.authorize(request);
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, response)) => Err(FirestoreError::Status {
                operation,
                path: path.to_string(),
                status,
                message: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(err)) => Err(FirestoreError::Transport {
                operation,
                path: path.to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn read_json<T: DeserializeOwned>(
        operation: &'static str,
        response: ureq::Response,
    ) -> Result<T, FirestoreError> {
        response
            .into_json::<T>()
            .map_err(|err| FirestoreError::Decode { operation, message: err.to_string() })
    }

    fn fetch(&self, path: &DocumentPath) -> Result<Option<Document>, FirestoreError> {
        let url = self.resource_url(&self.document_name(path), None)?;
        match self.send("get", &path.to_string(), self.agent.get(url.as_str()), None) {
            Ok(response) => {
                let raw: RawDocument = Self::read_json("get", response)?;
                Ok(Some(raw.into_document()))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn list(
        &self,
        collection: &CollectionPath,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page, FirestoreError> {
        let name = format!("{}/documents/{}", self.database, collection);
        let mut url = self.resource_url(&name, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &page_size.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        let request = self.agent.get(url.as_str());
        let response = self.send("list", &collection.to_string(), request, None)?;
        let listing: ListResponse = Self::read_json("list", response)?;
        Ok(Page {
            documents: listing.documents.into_iter().map(RawDocument::into_document).collect(),
            next_page_token: listing.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    fn query(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, FirestoreError> {
        let url = self.resource_url(&self.parent_name(collection), Some("runQuery"))?;
        let body = encode_eq_query(collection.collection_id(), field, value);
        let request = self.agent.post(url.as_str());
        let response = self.send("query", &collection.to_string(), request, Some(&body))?;
        let results: Vec<QueryResult> = Self::read_json("query", response)?;
        Ok(results.into_iter().filter_map(|r| r.document).map(RawDocument::into_document).collect())
    }

    fn commit_writes(&self, writes: &[Write]) -> Result<(), FirestoreError> {
        let encoded: Vec<Json> = writes
            .iter()
            .map(|write| {
                let name = self.document_name(write.path());
                encode_write(&name, write.fields(), matches!(write, Write::Create { .. }))
            })
            .collect();
        let url = self.resource_url(&format!("{}/documents", self.database), Some("commit"))?;
        let body = json!({ "writes": encoded });

        match self.send("commit", "documents", self.agent.post(url.as_str()), Some(&body)) {
            Ok(_) => {
                debug!(writes = writes.len(), "committed");
                Ok(())
            }
            Err(err) if err.is_precondition_failure() => {
                let path = writes
                    .iter()
                    .find(|w| matches!(w, Write::Create { .. }))
                    .map(|w| w.path().to_string())
                    .unwrap_or_default();
                Err(FirestoreError::AlreadyExists { path })
            }
            Err(err) => Err(err),
        }
    }
}

impl DocumentStore for FirestoreStore {
    fn get(&self, path: &DocumentPath) -> TableResult<Option<Document>> {
        Ok(self.fetch(path)?)
    }

    fn set(&self, path: &DocumentPath, fields: Fields) -> TableResult<()> {
        Ok(self.commit_writes(&[Write::Set { path: path.clone(), fields }])?)
    }

    fn create(&self, path: &DocumentPath, fields: Fields) -> TableResult<CreateOutcome> {
        match self.commit_writes(&[Write::Create { path: path.clone(), fields }]) {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(FirestoreError::AlreadyExists { .. }) => Ok(CreateOutcome::AlreadyExists),
            Err(err) => Err(err.into()),
        }
    }

    fn list_page(
        &self,
        collection: &CollectionPath,
        page_size: usize,
        page_token: Option<&str>,
    ) -> TableResult<Page> {
        Ok(self.list(collection, page_size, page_token)?)
    }

    fn query_eq(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> TableResult<Vec<Document>> {
        Ok(self.query(collection, field, value)?)
    }

    fn commit(&self, writes: Vec<Write>) -> TableResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        if writes.len() > DEFAULT_MAX_BATCH_SIZE {
            return Err(TableError::invalid(format!(
                "commit of {} writes exceeds the limit of {}",
                writes.len(),
                DEFAULT_MAX_BATCH_SIZE
            )));
        }
        Ok(self.commit_writes(&writes)?)
    }
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("base", &self.base.as_str())
            .field("database", &self.database)
            .field("authorized", &self.token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, ServiceAccountKey};

    fn store() -> FirestoreStore {
        FirestoreStore::connect(&FirestoreConfig::emulator("localhost:8080", "demo")).unwrap()
    }

    #[test]
    fn test_document_urls() {
        let store = store();
        let path = DocumentPath::mapping("phone-test", "+254 700");
        let url = store.resource_url(&store.document_name(&path), None).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/tables/phone-test/mappings/+254%20700"
        );
    }

    #[test]
    fn test_method_urls() {
        let store = store();
        let query = store
            .resource_url(&store.parent_name(&CollectionPath::mappings("t")), Some("runQuery"))
            .unwrap();
        assert!(query.as_str().ends_with("/documents/tables/t:runQuery"));

        let root = store
            .resource_url(&store.parent_name(&CollectionPath::tables()), Some("runQuery"))
            .unwrap();
        assert!(root.as_str().ends_with("/databases/(default)/documents:runQuery"));
    }

    #[test]
    fn test_project_from_credentials() {
        let key = ServiceAccountKey {
            key_type: Some("service_account".into()),
            project_id: "from-key".into(),
            client_email: None,
            private_key_id: None,
        };
        let config =
            FirestoreConfig::with_credentials(Credentials::Inline(key)).with_access_token("t");
        let store = FirestoreStore::connect(&config).unwrap();
        assert_eq!(store.project_id(), "from-key");
        let marker = store.document_name(&DocumentPath::table_marker("t"));
        assert!(marker.starts_with("projects/from-key/"));
    }

    #[test]
    fn test_emulator_gets_owner_token() {
        assert!(format!("{:?}", store()).contains("authorized: true"));
    }

    #[test]
    fn test_oversized_commit_rejected_locally() {
        let store = store();
        let writes = (0..=DEFAULT_MAX_BATCH_SIZE)
            .map(|i| Write::Set {
                path: DocumentPath::mapping("t", &i.to_string()),
                fields: Fields::new(),
            })
            .collect();
        assert!(matches!(store.commit(writes), Err(TableError::InvalidArgument { .. })));
    }
}
