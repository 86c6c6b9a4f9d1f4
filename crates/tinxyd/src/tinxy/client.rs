use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::AUTHORIZATION;
use secrecy::ExposeSecret;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::device::device_number;
use super::device::DeviceDescriptor;
use super::device::StateResponse;
use super::device::ToggleRequest;
use super::error::ClientError;
use super::error::ConfigurationError;
use super::error::FetchError;
use super::error::ReadError;
use super::error::WriteError;

/// Trait for the remote device operations the platform needs
///
/// This trait allows for mocking the Tinxy backend for testing purposes
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// List every device on the account
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, FetchError>;

    /// Read the on/off state of one unit of a device
    async fn read_unit_state(&self, device_id: &str, unit_index: usize)
        -> Result<bool, ReadError>;

    /// Switch one unit of a device on or off
    async fn write_unit_state(
        &self,
        device_id: &str,
        unit_index: usize,
        on: bool,
    ) -> Result<(), WriteError>;
}

/// HTTP client for the Tinxy cloud backend
///
/// Every request carries the account's bearer token as a default header.
pub struct TinxyClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TinxyClient {
    /// Build a client from the account token and backend URL.
    ///
    /// Fails before any network call if the token is missing.
    pub fn new(
        api_token: Option<&SecretString>,
        api_base_url: &str,
        request_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        let token = api_token
            .map(|t| t.expose_secret())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigurationError::MissingCredential)?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ConfigurationError::InvalidCredential)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(ConfigurationError::HttpClient)?;

        let base_url = normalize_base_url(api_base_url)?;
        Ok(Self { http, base_url })
    }

    /// Append `segments` to the base URL, percent-encoding each one so a
    /// device id can never change the request target.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = self.url(segments)?;
        debug!("GET {} params={:?}", url, params);

        let resp = self.http.get(url).query(params).send().await?;
        Self::decode(resp).await
    }

    async fn post(&self, segments: &[&str], body: &ToggleRequest) -> Result<(), ClientError> {
        let url = self.url(segments)?;
        debug!("POST {} body={:?}", url, body);

        let resp = self.http.post(url).json(body).send().await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let resp = Self::check_status(resp).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Ensure the base URL ends with `/` and can take path segments.
fn normalize_base_url(raw: &str) -> Result<Url, ConfigurationError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };

    let url = Url::parse(&with_slash).map_err(|source| ConfigurationError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigurationError::InvalidBaseUrl {
            url: raw.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }
    Ok(url)
}

#[async_trait]
impl DeviceClient for TinxyClient {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, FetchError> {
        let devices: Vec<DeviceDescriptor> = self.get(&["devices", ""], &[]).await?;
        debug!("Received {} devices", devices.len());
        Ok(devices)
    }

    async fn read_unit_state(
        &self,
        device_id: &str,
        unit_index: usize,
    ) -> Result<bool, ReadError> {
        let params = [("deviceNumber", device_number(unit_index).to_string())];

        let resp: StateResponse = self
            .get(&["devices", device_id, "state"], &params)
            .await
            .map_err(|source| ReadError {
                device_id: device_id.to_string(),
                unit_index,
                source,
            })?;

        Ok(resp.state.is_on())
    }

    async fn write_unit_state(
        &self,
        device_id: &str,
        unit_index: usize,
        on: bool,
    ) -> Result<(), WriteError> {
        let body = ToggleRequest::new(unit_index, on);

        self.post(&["devices", device_id, "toggle"], &body)
            .await
            .map_err(|source| WriteError {
                device_id: device_id.to_string(),
                unit_index,
                source,
            })?;

        debug!(
            "Set device {} unit {} to {}",
            device_id,
            unit_index,
            if on { "on" } else { "off" }
        );
        Ok(())
    }
}

/// Mock Tinxy backend for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockDeviceClient {
    /// `None` makes `list_devices` fail
    pub devices: std::sync::Mutex<Option<Vec<DeviceDescriptor>>>,
    pub states: std::sync::Mutex<std::collections::HashMap<(String, usize), bool>>,
    pub failing_reads: std::sync::Mutex<std::collections::HashSet<(String, usize)>>,
    pub failing_writes: std::sync::Mutex<std::collections::HashSet<(String, usize)>>,
    pub read_delays: std::sync::Mutex<std::collections::HashMap<(String, usize), Duration>>,
    pub reads: std::sync::Mutex<Vec<(String, usize)>>,
    pub writes: std::sync::Mutex<Vec<(String, usize, bool)>>,
}

#[cfg(test)]
impl MockDeviceClient {
    /// Create a mock backend that lists the given devices
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let client = Self::default();
        client.set_devices(Some(devices));
        client
    }

    pub fn set_devices(&self, devices: Option<Vec<DeviceDescriptor>>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn set_state(&self, device_id: &str, unit_index: usize, on: bool) {
        self.states
            .lock()
            .unwrap()
            .insert((device_id.to_string(), unit_index), on);
    }

    pub fn state(&self, device_id: &str, unit_index: usize) -> Option<bool> {
        self.states
            .lock()
            .unwrap()
            .get(&(device_id.to_string(), unit_index))
            .copied()
    }

    pub fn fail_reads(&self, device_id: &str, unit_index: usize) {
        self.failing_reads
            .lock()
            .unwrap()
            .insert((device_id.to_string(), unit_index));
    }

    pub fn fail_writes(&self, device_id: &str, unit_index: usize) {
        self.failing_writes
            .lock()
            .unwrap()
            .insert((device_id.to_string(), unit_index));
    }

    /// Make every read of this unit take `delay` before answering
    pub fn delay_reads(&self, device_id: &str, unit_index: usize, delay: Duration) {
        self.read_delays
            .lock()
            .unwrap()
            .insert((device_id.to_string(), unit_index), delay);
    }

    /// Number of reads started for a unit
    pub fn read_count(&self, device_id: &str, unit_index: usize) -> usize {
        self.reads
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, index)| id == device_id && *index == unit_index)
            .count()
    }

    fn unavailable() -> ClientError {
        ClientError::Status {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "mock failure".to_string(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DeviceClient for MockDeviceClient {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, FetchError> {
        self.devices
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::from(Self::unavailable()))
    }

    async fn read_unit_state(
        &self,
        device_id: &str,
        unit_index: usize,
    ) -> Result<bool, ReadError> {
        let key = (device_id.to_string(), unit_index);
        self.reads.lock().unwrap().push(key.clone());

        let delay = self.read_delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_reads.lock().unwrap().contains(&key) {
            return Err(ReadError {
                device_id: device_id.to_string(),
                unit_index,
                source: Self::unavailable(),
            });
        }

        Ok(self.states.lock().unwrap().get(&key).copied().unwrap_or(false))
    }

    async fn write_unit_state(
        &self,
        device_id: &str,
        unit_index: usize,
        on: bool,
    ) -> Result<(), WriteError> {
        let key = (device_id.to_string(), unit_index);

        if self.failing_writes.lock().unwrap().contains(&key) {
            return Err(WriteError {
                device_id: device_id.to_string(),
                unit_index,
                source: Self::unavailable(),
            });
        }

        self.writes
            .lock()
            .unwrap()
            .push((device_id.to_string(), unit_index, on));
        self.states.lock().unwrap().insert(key, on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_is_configuration_error() {
        let result = TinxyClient::new(None, "https://example.com/v2/", Duration::from_secs(5));
        assert!(matches!(result, Err(ConfigurationError::MissingCredential)));

        let empty = SecretString::from(String::new());
        let result = TinxyClient::new(Some(&empty), "https://example.com/v2/", Duration::from_secs(5));
        assert!(matches!(result, Err(ConfigurationError::MissingCredential)));
    }

    #[test]
    fn test_invalid_base_url() {
        let token = SecretString::from("token".to_string());
        let result = TinxyClient::new(Some(&token), "not a url", Duration::from_secs(5));
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidBaseUrl { .. })
        ));
    }

    fn client(base_url: &str) -> TinxyClient {
        let token = SecretString::from("token".to_string());
        TinxyClient::new(Some(&token), base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = client("https://ha-backend.tinxy.in/v2");
        assert_eq!(
            client.url(&["devices", ""]).unwrap().as_str(),
            "https://ha-backend.tinxy.in/v2/devices/"
        );
        assert_eq!(
            client.url(&["devices", "abc123", "state"]).unwrap().as_str(),
            "https://ha-backend.tinxy.in/v2/devices/abc123/state"
        );
    }

    #[test]
    fn test_device_id_is_one_path_segment() {
        let client = client("https://ha-backend.tinxy.in/v2/");
        assert_eq!(
            client.url(&["devices", "a/b?c#d", "toggle"]).unwrap().as_str(),
            "https://ha-backend.tinxy.in/v2/devices/a%2Fb%3Fc%23d/toggle"
        );
        assert_eq!(
            client.url(&["devices", "../x", "state"]).unwrap().path(),
            "/v2/devices/..%2Fx/state"
        );
    }

    #[test]
    fn test_cannot_be_a_base_url_is_rejected() {
        assert!(matches!(
            normalize_base_url("mailto:someone"),
            Err(ConfigurationError::InvalidBaseUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_sibling_isolation() {
        let client = MockDeviceClient::default();
        client.fail_writes("dev", 0);

        assert!(client.write_unit_state("dev", 0, true).await.is_err());
        assert!(client.write_unit_state("dev", 1, true).await.is_ok());
        assert!(client.read_unit_state("dev", 1).await.unwrap());
    }
}
