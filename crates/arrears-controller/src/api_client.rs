use crate::error::{ControllerError, Result};
use crate::traits::{ClusterApi, WatchStream};
use arrears_core::{GroupVersionKind, Resource, ResourceKey, WatchEvent, WatchEventType};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream, StreamExt};
use k8s_openapi::api::core::v1::{Namespace, Pod, ResourceQuota};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// HTTP client for a Kubernetes-style API server
pub struct ApiClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Watch frame as sent on the wire, before the object is typed
#[derive(Debug, Deserialize)]
struct RawWatchEvent {
    #[serde(rename = "type")]
    event_type: WatchEventType,
    object: serde_json::Value,
}

/// Incremental decoder for a server-sent-events body. Yields the payload of
/// every complete event; multi-line `data:` fields are joined with `\n`.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: BytesMut,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

            if line.is_empty() {
                if !self.data.is_empty() {
                    frames.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // comments (keep-alives), event: and id: fields are ignored
        }
        frames
    }
}

fn decode_frame<T: DeserializeOwned>(frame: &str) -> Result<WatchEvent<T>> {
    let raw: RawWatchEvent = serde_json::from_str(frame)
        .map_err(|e| ControllerError::watch_failed(format!("Malformed watch frame: {}", e)))?;

    if raw.event_type == WatchEventType::Error {
        let message = raw.object["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string();
        return Err(ControllerError::watch_failed(message));
    }

    let object = serde_json::from_value(raw.object)
        .map_err(|e| ControllerError::watch_failed(format!("Malformed watch object: {}", e)))?;
    Ok(WatchEvent {
        event_type: raw.event_type,
        object,
    })
}

fn object_name(key: &ResourceKey) -> String {
    if key.is_namespaced() {
        format!("{}/{}", key.namespace, key.name)
    } else {
        key.name.clone()
    }
}

fn request_failed(e: reqwest::Error) -> ControllerError {
    ControllerError::api_error(format!("HTTP request failed: {}", e))
}

/// Map a non-success response onto the error variants the controller
/// distinguishes
async fn check(resp: Response, method: &str, key: &ResourceKey) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, method, key, body))
}

/// A 409 means the name is taken on POST, but a stale resourceVersion on PUT
fn status_error(
    status: StatusCode,
    method: &str,
    key: &ResourceKey,
    body: String,
) -> ControllerError {
    let kind = key.gvk.kind.as_str();
    let name = object_name(key);

    match status {
        StatusCode::NOT_FOUND => ControllerError::not_found(kind, name),
        StatusCode::CONFLICT if method == "PUT" => ControllerError::conflict(kind, name, body),
        StatusCode::CONFLICT => ControllerError::already_exists(kind, name),
        StatusCode::FORBIDDEN => ControllerError::forbidden(kind, name, body),
        _ => ControllerError::api_error(format!(
            "{} {} failed with status {}: {}",
            method, name, status, body
        )),
    }
}

/// Typed watch events from a server-sent-events body
fn sse_events<T, S, E>(body: S) -> WatchStream<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    stream::unfold(
        (Box::pin(body), SseDecoder::default(), VecDeque::<String>::new()),
        |(mut body, mut decoder, mut pending)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    let event = decode_frame::<T>(&frame);
                    return Some((event, (body, decoder, pending)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                    Some(Err(e)) => {
                        let err = ControllerError::watch_failed(format!(
                            "Watch stream interrupted: {}",
                            e
                        ));
                        return Some((Err(err), (body, decoder, pending)));
                    }
                    None => return None,
                }
            }
        },
    )
    .boxed()
}

async fn parse<T: DeserializeOwned>(resp: Response, key: &ResourceKey) -> Result<T> {
    resp.json::<T>().await.map_err(|e| {
        ControllerError::api_error(format!(
            "Failed to parse {} {}: {}",
            key.gvk.kind,
            object_name(key),
            e
        ))
    })
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, key: &ResourceKey) -> Result<T> {
        let url = self.url(&key.api_path());
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await.map_err(request_failed)?;
        let resp = check(resp, "GET", key).await?;
        parse(resp, key).await
    }

    async fn list<T: DeserializeOwned>(&self, key: &ResourceKey) -> Result<Vec<T>> {
        let url = self.url(&key.collection_path());
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await.map_err(request_failed)?;
        let resp = check(resp, "LIST", key).await?;
        Ok(parse::<ItemList<T>>(resp, key).await?.items)
    }

    async fn create<T: Serialize + DeserializeOwned>(
        &self,
        key: &ResourceKey,
        object: &T,
    ) -> Result<T> {
        let url = self.url(&key.collection_path());
        debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .json(object)
            .send()
            .await
            .map_err(request_failed)?;
        let resp = check(resp, "POST", key).await?;
        parse(resp, key).await
    }

    async fn replace<T: Serialize + DeserializeOwned>(
        &self,
        key: &ResourceKey,
        object: &T,
    ) -> Result<T> {
        let url = self.url(&key.api_path());
        debug!("PUT {}", url);

        let resp = self
            .client
            .put(&url)
            .json(object)
            .send()
            .await
            .map_err(request_failed)?;
        let resp = check(resp, "PUT", key).await?;
        parse(resp, key).await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        let url = self.url(&key.api_path());
        debug!("DELETE {}", url);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(request_failed)?;
        check(resp, "DELETE", key).await?;
        Ok(())
    }

    /// Open a watch on a collection. Resolves once the server has accepted
    /// the watch; events are read from the SSE body as they arrive.
    async fn watch<T>(&self, key: &ResourceKey) -> Result<WatchStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = format!("{}?watch=true", self.url(&key.collection_path()));
        debug!("WATCH {}", url);

        let resp = self.client.get(&url).send().await.map_err(request_failed)?;
        let resp = check(resp, "WATCH", key).await?;

        Ok(sse_events(resp.bytes_stream()))
    }
}

fn pod_key(namespace: &str, name: &str) -> ResourceKey {
    ResourceKey::new(GroupVersionKind::pod(), namespace, name)
}

fn namespace_key(name: &str) -> ResourceKey {
    ResourceKey::cluster_scoped(GroupVersionKind::namespace(), name)
}

fn quota_key(namespace: &str, name: &str) -> ResourceKey {
    ResourceKey::new(GroupVersionKind::resource_quota(), namespace, name)
}

#[async_trait]
impl ClusterApi for ApiClient {
    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.get(&namespace_key(name)).await
    }

    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        self.replace(&namespace.resource_key()?, namespace).await
    }

    async fn watch_namespaces(&self) -> Result<WatchStream<Namespace>> {
        self.watch(&namespace_key("")).await
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        self.list(&pod_key(namespace, "")).await
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        self.create(&pod.resource_key()?, pod).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete(&pod_key(namespace, name)).await
    }

    async fn watch_pods(&self, namespace: &str) -> Result<WatchStream<Pod>> {
        self.watch(&pod_key(namespace, "")).await
    }

    async fn get_resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
        self.get(&quota_key(namespace, name)).await
    }

    async fn create_resource_quota(&self, quota: &ResourceQuota) -> Result<ResourceQuota> {
        self.create(&quota.resource_key()?, quota).await
    }

    async fn delete_resource_quota(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete(&quota_key(namespace, name)).await
    }
}
