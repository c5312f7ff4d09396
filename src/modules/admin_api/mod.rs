//! Admin API Module
//!
//! Certificate management handlers for the control endpoint. The external
//! routing layer matches method and path, then dispatches here with the
//! raw body or path parameter; every handler returns a complete JSON
//! `http::Response`. Private keys never leave the store through this
//! surface, only ids, fingerprints, and a key-presence flag.

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde_json::json;
use tracing::info;

use crate::modules::cert_store::{CertStoreError, CertificateStore};

/// Certificate management endpoints over the shared store.
#[derive(Debug, Clone)]
pub struct CertsApi {
    store: Arc<CertificateStore>,
}

impl CertsApi {
    /// Creates the API over the given store.
    #[must_use]
    pub fn new(store: Arc<CertificateStore>) -> Self {
        Self { store }
    }

    /// `GET /certs`: every stored id, sorted.
    ///
    /// An empty store renders as `{"certs":null}` rather than an empty
    /// array.
    #[must_use]
    pub fn list(&self) -> http::Response<Bytes> {
        match self.store.list() {
            Ok(ids) if ids.is_empty() => json_response(StatusCode::OK, &json!({ "certs": null })),
            Ok(ids) => json_response(StatusCode::OK, &json!({ "certs": ids })),
            Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        }
    }

    /// `POST /certs`: store the raw PEM body and return its derived id.
    #[must_use]
    pub fn add(&self, body: &[u8]) -> http::Response<Bytes> {
        match self.store.add(body, None) {
            Ok(id) => {
                info!(id = %id, "Certificate added via admin API");
                json_response(StatusCode::OK, &json!({ "id": id }))
            }
            Err(err @ CertStoreError::MalformedPem { .. }) => {
                error_response(StatusCode::BAD_REQUEST, &err.to_string())
            }
            Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        }
    }

    /// `GET /certs/{id}`: summary of one entry, or of several when the
    /// path parameter is a comma-separated list.
    ///
    /// A single id renders as an object, a list as an order-preserving
    /// array with unresolvable ids skipped. 404 when nothing resolves.
    #[must_use]
    pub fn get(&self, param: &str) -> http::Response<Bytes> {
        let ids: Vec<&str> = param
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();

        let meta = self.store.get_meta(&ids);
        if meta.is_empty() {
            return error_response(StatusCode::NOT_FOUND, "certificate not found");
        }

        if ids.len() == 1 {
            json_response(StatusCode::OK, &json!(&meta[0]))
        } else {
            json_response(StatusCode::OK, &json!(&meta))
        }
    }

    /// `DELETE /certs/{id}`: remove one entry.
    #[must_use]
    pub fn delete(&self, id: &str) -> http::Response<Bytes> {
        match self.store.delete(id) {
            Ok(()) => {
                info!(id = %id, "Certificate deleted via admin API");
                json_response(StatusCode::OK, &json!({ "status": "ok" }))
            }
            Err(err @ CertStoreError::NotFound { .. }) => {
                error_response(StatusCode::NOT_FOUND, &err.to_string())
            }
            Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        }
    }
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: &str) -> http::Response<Bytes> {
    json_response(status, &json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cert_store::InMemoryBackend;

    fn api() -> CertsApi {
        CertsApi::new(Arc::new(CertificateStore::new(Box::new(
            InMemoryBackend::new(),
        ))))
    }

    fn body_json(response: &http::Response<Bytes>) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    fn sample_pem() -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        format!("{}{}", cert.pem(), key.serialize_pem())
    }

    #[test]
    fn test_empty_list_renders_null() {
        let response = api().list();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response), json!({ "certs": null }));
    }

    #[test]
    fn test_add_then_list_and_get() {
        let api = api();
        let pem = sample_pem();

        let added = api.add(pem.as_bytes());
        assert_eq!(added.status(), StatusCode::OK);
        let id = body_json(&added)["id"].as_str().unwrap().to_string();

        let listed = body_json(&api.list());
        assert_eq!(listed["certs"], json!([id.clone()]));

        let got = api.get(&id);
        assert_eq!(got.status(), StatusCode::OK);
        let meta = body_json(&got);
        assert_eq!(meta["id"], json!(id));
        assert_eq!(meta["has_private"], json!(true));
        assert!(meta.get("pem").is_none());
    }

    #[test]
    fn test_add_malformed_pem_is_bad_request() {
        let response = api().add(b"not a pem");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(&response)["error"].is_string());
    }

    #[test]
    fn test_get_comma_separated_preserves_order_and_skips_missing() {
        let api = api();
        let id_a = body_json(&api.add(sample_pem().as_bytes()))["id"]
            .as_str()
            .unwrap()
            .to_string();
        let id_b = body_json(&api.add(sample_pem().as_bytes()))["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = api.get(&format!("{id_b},missing,{id_a}"));
        assert_eq!(response.status(), StatusCode::OK);
        let metas = body_json(&response);
        let metas = metas.as_array().unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0]["id"], json!(id_b));
        assert_eq!(metas[1]["id"], json!(id_a));
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let response = api().get("missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_delete_roundtrip() {
        let api = api();
        let id = body_json(&api.add(sample_pem().as_bytes()))["id"]
            .as_str()
            .unwrap()
            .to_string();

        assert_eq!(api.delete(&id).status(), StatusCode::OK);
        assert_eq!(api.delete(&id).status(), StatusCode::NOT_FOUND);
        assert_eq!(api.get(&id).status(), StatusCode::NOT_FOUND);
    }
}
