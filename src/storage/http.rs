//! reqwest-backed [`BlobTransport`]

use std::time::Duration;

use async_trait::async_trait;
use log::trace;
use reqwest::multipart::{Form, Part};

use super::{BlobTransport, HttpMethod, HttpReply, HttpRequest};

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl BlobTransport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, String> {
        trace!("{:?} {}", request.method, request.url);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Head => self.client.head(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        if let Some(body) = request.body {
            let part = Part::bytes(body)
                .file_name("blob")
                .mime_str("application/octet-stream")
                .map_err(|e| format!("multipart: {}", e))?;
            builder = builder.multipart(Form::new().part("file", part));
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();

        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }
}
