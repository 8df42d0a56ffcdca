use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use std::io::Write;

use super::{BrowserError, BrowserService, BrowserTarget, Credentials, RetryPolicy, RETRY_STATUS_CODES};
use crate::types::AnnotatedRegion;

/// Blocking HTTP implementation of [`BrowserService`].
pub struct HttpBrowser {
    client: Client,
    target: BrowserTarget,
    credentials: Option<Credentials>,
    retry: RetryPolicy,
}

impl HttpBrowser {
    pub fn new(
        target: BrowserTarget,
        credentials: Option<Credentials>,
        retry: RetryPolicy,
    ) -> Result<Self, BrowserError> {
        let client = Client::builder()
            .user_agent(concat!("soda/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, target, credentials, retry))
    }

    pub(crate) fn with_client(
        client: Client,
        target: BrowserTarget,
        credentials: Option<Credentials>,
        retry: RetryPolicy,
    ) -> Self {
        if let Some(credentials) = &credentials {
            log::debug!("Using {} credentials for {}", credentials.scheme(), target.base_url());
        }
        Self {
            client,
            target,
            credentials,
            retry,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(credentials) => credentials.apply(request),
            None => request,
        }
    }

    /// Send with transport-level retry. 401 and retryable statuses are
    /// turned into errors here; other statuses are left to the caller.
    fn send<F>(&self, url: &str, build: F) -> Result<Response, BrowserError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.retry.run(
            |attempt| {
                log::trace!("Request {} (attempt {})", url, attempt + 1);
                let response = self.authorize(build(&self.client)).send()?;
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED {
                    return Err(BrowserError::Unauthorized {
                        url: url.to_string(),
                    });
                }
                if RETRY_STATUS_CODES.contains(&status.as_u16()) {
                    return Err(status_error(url, response));
                }
                Ok(response)
            },
            BrowserError::is_transient,
        )
    }
}

fn status_error(url: &str, response: Response) -> BrowserError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    BrowserError::Status {
        url: url.to_string(),
        status,
        body,
    }
}

fn read_body(url: &str, response: Response) -> Result<String, BrowserError> {
    response.text().map_err(|err| BrowserError::Truncated {
        url: url.to_string(),
        message: err.to_string(),
    })
}

impl BrowserService for HttpBrowser {
    fn target(&self) -> &BrowserTarget {
        &self.target
    }

    fn submit_position(&self, region: &AnnotatedRegion) -> Result<String, BrowserError> {
        let url = self.target.cart_dump_url();
        let form = self.target.cart_form(region);
        log::debug!("Submitting position {} to {}", region.position(), url);

        let response = self.send(&url, |client| client.post(&url).form(&form))?;
        if response.status() != StatusCode::OK {
            return Err(status_error(&url, response));
        }
        read_body(&url, response)
    }

    fn fetch_render_page(&self, region: &AnnotatedRegion) -> Result<String, BrowserError> {
        let url = self.target.render_url(region);
        log::debug!("Requesting render page {}", url);

        let response = self.send(&url, |client| client.get(&url))?;
        if !response.status().is_success() {
            return Err(status_error(&url, response));
        }
        read_body(&url, response)
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, BrowserError> {
        let mut response = self.send(url, |client| client.get(url))?;
        if !response.status().is_success() {
            return Err(status_error(url, response));
        }
        let bytes = std::io::copy(&mut response, sink)?;
        sink.flush()?;
        log::debug!("Downloaded {} bytes from {}", bytes, url);
        Ok(bytes)
    }
}
