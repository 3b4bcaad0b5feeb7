// PostgREST-style HTTP mirror.
//
//   GET    {base}/rest/v1/documents?select=*,section_locks:document_section_locks(*)&type=eq.T&is_deleted=eq.false
//   POST   {base}/rest/v1/documents                       Prefer: return=representation
//   PATCH  {base}/rest/v1/documents?id=eq.ID              Prefer: return=representation
//   DELETE {base}/rest/v1/document_section_locks?document_id=eq.ID
//   POST   {base}/rest/v1/document_section_locks
//
// Auth goes in two default headers: `apikey` and `Authorization: Bearer`.

use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde_json::json;
use tracing::debug;
use url::Url;

use permitvault_common::protocol::remote::{
    RemoteDocumentDraft, RemoteDocumentRecord, SectionLockRow,
};
use permitvault_common::types::DocumentId;

use super::{MirrorError, RemoteMirror};
use crate::config::RemoteConfig;

const PREFER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";

pub struct HttpMirror {
    base: Url,
    client: Client,
    documents_table: String,
    section_locks_table: String,
}

impl HttpMirror {
    /// Build a client for `config.base_url`. The key is never persisted.
    pub fn new(config: &RemoteConfig, api_key: &str) -> Result<Self, MirrorError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| MirrorError::Unavailable("no remote base_url configured".into()))?;
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "apikey",
            header::HeaderValue::from_str(api_key).map_err(|_| MirrorError::InvalidApiKey)?,
        );
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| MirrorError::InvalidApiKey)?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            base,
            client,
            documents_table: config.documents_table.clone(),
            section_locks_table: config.section_locks_table.clone(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, MirrorError> {
        Ok(self.base.join(&format!("rest/v1/{table}"))?)
    }

    pub fn list_url(
        &self,
        document_type: &str,
        templates_only: Option<bool>,
    ) -> Result<Url, MirrorError> {
        let mut url = self.table_url(&self.documents_table)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("select", &format!("*,section_locks:{}(*)", self.section_locks_table))
                .append_pair("type", &format!("eq.{document_type}"))
                .append_pair("is_deleted", "eq.false");
            if let Some(templates) = templates_only {
                query.append_pair("is_template", &format!("eq.{templates}"));
            }
            query.append_pair("order", "updated_at.desc");
        }
        Ok(url)
    }

    fn document_url(&self, id: &DocumentId) -> Result<Url, MirrorError> {
        let mut url = self.table_url(&self.documents_table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        Ok(url)
    }

    fn locks_url(&self, id: Option<&DocumentId>) -> Result<Url, MirrorError> {
        let mut url = self.table_url(&self.section_locks_table)?;
        if let Some(id) = id {
            url.query_pairs_mut().append_pair("document_id", &format!("eq.{id}"));
        }
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response, MirrorError> {
        if response.status() == StatusCode::NOT_FOUND {
            return Err(MirrorError::NotFound(response.url().to_string()));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(MirrorError::Server { status, message });
        }
        Ok(response)
    }

    async fn single_record(response: Response) -> Result<RemoteDocumentRecord, MirrorError> {
        let rows: Vec<RemoteDocumentRecord> = Self::check(response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| MirrorError::InvalidResponse("empty representation".into()))
    }
}

impl RemoteMirror for HttpMirror {
    async fn list(
        &self,
        document_type: &str,
        templates_only: Option<bool>,
    ) -> Result<Vec<RemoteDocumentRecord>, MirrorError> {
        let url = self.list_url(document_type, templates_only)?;
        debug!(document_type, "listing remote documents");
        let response = self.client.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create(&self, draft: &RemoteDocumentDraft) -> Result<RemoteDocumentRecord, MirrorError> {
        let url = self.table_url(&self.documents_table)?;
        let response = self
            .client
            .post(url)
            .header(PREFER, RETURN_REPRESENTATION)
            .json(draft)
            .send()
            .await?;
        Self::single_record(response).await
    }

    async fn update(
        &self,
        id: &DocumentId,
        draft: &RemoteDocumentDraft,
    ) -> Result<RemoteDocumentRecord, MirrorError> {
        let url = self.document_url(id)?;
        let response = self
            .client
            .patch(url)
            .header(PREFER, RETURN_REPRESENTATION)
            .json(draft)
            .send()
            .await?;
        Self::single_record(response).await
    }

    async fn soft_delete(&self, id: &DocumentId) -> Result<(), MirrorError> {
        let url = self.document_url(id)?;
        let response = self.client.patch(url).json(&json!({ "is_deleted": true })).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn replace_section_locks(
        &self,
        id: &DocumentId,
        rows: &[SectionLockRow],
    ) -> Result<(), MirrorError> {
        let response = self.client.delete(self.locks_url(Some(id))?).send().await?;
        Self::check(response).await?;
        if rows.is_empty() {
            return Ok(());
        }
        let response = self.client.post(self.locks_url(None)?).json(rows).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
