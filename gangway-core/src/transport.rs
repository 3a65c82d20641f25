//! Reqwest-backed implementations of the OIDC and portal transports.
//!
//! These are the only components that know the AWS wire formats. Everything
//! upstream depends on the [`OidcClient`] and [`CatalogClient`] traits, so
//! tests never touch the network.

use std::future::Future;
use std::pin::Pin;

use chrono::DateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::credentials::RoleCredentials;
use crate::device_auth::{
    CLIENT_NAME, CLIENT_TYPE, CreateTokenResponse, DEVICE_GRANT_TYPE, DeviceAuthorization,
    OidcClient, RegisteredClient,
};
use crate::discovery::{AccountPage, CatalogClient, DiscoveredAccount, DiscoveredRole, RolePage};
use crate::error::{GangwayError, Result};

/// User agent reported on every request.
const USER_AGENT: &str = "gangway";

/// Bearer-token header expected by the SSO portal API.
const SSO_BEARER_HEADER: &str = "x-amz-sso_bearer_token";

/// SSO OIDC transport over HTTPS.
pub struct HttpOidcClient {
    client: Client,
    endpoint: String,
}

impl HttpOidcClient {
    /// Build a transport for the identity provider in the given region.
    pub fn new(region: &str) -> Result<Self> {
        Self::with_endpoint(format!("https://oidc.{region}.amazonaws.com"))
    }

    /// Build a transport against an explicit endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterClientRequest<'a> {
    client_name: &'a str,
    client_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterClientWire {
    client_id: String,
    client_secret: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartDeviceAuthorizationRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    start_url: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceAuthorizationWire {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    device_code: &'a str,
    grant_type: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CreateTokenWire {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "error_description")]
    error_description: Option<String>,
}

impl From<CreateTokenWire> for CreateTokenResponse {
    fn from(wire: CreateTokenWire) -> Self {
        Self {
            access_token: wire.access_token,
            expires_in: wire.expires_in,
            error: wire.error,
            error_description: wire.error_description,
        }
    }
}

async fn register_client(client: &Client, endpoint: &str) -> Result<RegisteredClient> {
    let response = client
        .post(format!("{endpoint}/client/register"))
        .json(&RegisterClientRequest {
            client_name: CLIENT_NAME,
            client_type: CLIENT_TYPE,
        })
        .send()
        .await?
        .error_for_status()?;
    let wire = response.json::<RegisterClientWire>().await?;
    Ok(RegisteredClient {
        client_id: wire.client_id,
        client_secret: wire.client_secret,
    })
}

async fn start_device_authorization(
    client: &Client,
    endpoint: &str,
    registered: &RegisteredClient,
    start_url: &str,
) -> Result<DeviceAuthorization> {
    let response = client
        .post(format!("{endpoint}/device_authorization"))
        .json(&StartDeviceAuthorizationRequest {
            client_id: &registered.client_id,
            client_secret: &registered.client_secret,
            start_url,
        })
        .send()
        .await?
        .error_for_status()?;
    let wire = response.json::<DeviceAuthorizationWire>().await?;
    Ok(DeviceAuthorization {
        device_code: wire.device_code,
        user_code: wire.user_code,
        verification_uri: wire.verification_uri,
        verification_uri_complete: wire.verification_uri_complete,
        interval: wire.interval,
    })
}

/// Call the token endpoint once.
///
/// Non-2xx responses still carry the OAuth error identifier the poll loop
/// classifies on, so the body is parsed regardless of status instead of
/// being treated as a transport failure.
async fn create_token(
    client: &Client,
    endpoint: &str,
    registered: &RegisteredClient,
    device_code: &str,
) -> Result<CreateTokenResponse> {
    let response = client
        .post(format!("{endpoint}/token"))
        .json(&CreateTokenRequest {
            client_id: &registered.client_id,
            client_secret: &registered.client_secret,
            device_code,
            grant_type: DEVICE_GRANT_TYPE,
        })
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    match serde_json::from_str::<CreateTokenWire>(&body) {
        Ok(wire) => Ok(wire.into()),
        Err(err) => Err(GangwayError::Transport(format!(
            "token endpoint returned status {} with unreadable body: {err}",
            status.as_u16()
        ))),
    }
}

impl OidcClient for HttpOidcClient {
    fn register_client<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredClient>> + Send + 'a>> {
        Box::pin(register_client(&self.client, &self.endpoint))
    }

    fn start_device_authorization<'a>(
        &'a self,
        client: &'a RegisteredClient,
        start_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DeviceAuthorization>> + Send + 'a>> {
        Box::pin(start_device_authorization(
            &self.client,
            &self.endpoint,
            client,
            start_url,
        ))
    }

    fn create_token<'a>(
        &'a self,
        client: &'a RegisteredClient,
        device_code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CreateTokenResponse>> + Send + 'a>> {
        Box::pin(create_token(
            &self.client,
            &self.endpoint,
            client,
            device_code,
        ))
    }
}

/// SSO portal (role catalog) transport over HTTPS.
pub struct HttpCatalogClient {
    client: Client,
    endpoint: String,
}

impl HttpCatalogClient {
    /// Build a transport for the portal in the given region.
    pub fn new(region: &str) -> Result<Self> {
        Self::with_endpoint(format!("https://portal.sso.{region}.amazonaws.com"))
    }

    /// Build a transport against an explicit endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AccountWire {
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    account_name: String,
    #[serde(default)]
    email_address: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AccountListWire {
    #[serde(default)]
    account_list: Vec<AccountWire>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RoleWire {
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    role_name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RoleListWire {
    #[serde(default)]
    role_list: Vec<RoleWire>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleCredentialsWire {
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    secret_access_key: String,
    #[serde(default)]
    session_token: String,
    #[serde(default)]
    expiration: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRoleCredentialsWire {
    role_credentials: RoleCredentialsWire,
}

async fn list_accounts(
    client: &Client,
    endpoint: &str,
    access_token: &str,
    next_token: Option<&str>,
) -> Result<AccountPage> {
    let mut request = client
        .get(format!("{endpoint}/assignment/accounts"))
        .header(SSO_BEARER_HEADER, access_token);
    if let Some(token) = next_token {
        request = request.query(&[("next_token", token)]);
    }
    let response = request.send().await?.error_for_status()?;
    let wire = response.json::<AccountListWire>().await?;
    Ok(AccountPage {
        accounts: wire
            .account_list
            .into_iter()
            .map(|account| DiscoveredAccount {
                account_id: account.account_id,
                account_name: account.account_name,
                email: account.email_address,
            })
            .collect(),
        next_token: wire.next_token,
    })
}

async fn list_account_roles(
    client: &Client,
    endpoint: &str,
    access_token: &str,
    account_id: &str,
    next_token: Option<&str>,
) -> Result<RolePage> {
    let mut request = client
        .get(format!("{endpoint}/assignment/roles"))
        .header(SSO_BEARER_HEADER, access_token)
        .query(&[("account_id", account_id)]);
    if let Some(token) = next_token {
        request = request.query(&[("next_token", token)]);
    }
    let response = request.send().await?.error_for_status()?;
    let wire = response.json::<RoleListWire>().await?;
    Ok(RolePage {
        roles: wire
            .role_list
            .into_iter()
            .map(|role| DiscoveredRole {
                account_id: role.account_id,
                role_name: role.role_name,
            })
            .collect(),
        next_token: wire.next_token,
    })
}

async fn get_role_credentials(
    client: &Client,
    endpoint: &str,
    access_token: &str,
    account_id: &str,
    role_name: &str,
) -> Result<RoleCredentials> {
    let response = client
        .get(format!("{endpoint}/federation/credentials"))
        .header(SSO_BEARER_HEADER, access_token)
        .query(&[("account_id", account_id), ("role_name", role_name)])
        .send()
        .await?
        .error_for_status()?;
    let wire = response.json::<GetRoleCredentialsWire>().await?;
    let credentials = wire.role_credentials;
    // The portal reports expiration as epoch milliseconds.
    let expiration = DateTime::from_timestamp_millis(credentials.expiration).ok_or_else(|| {
        GangwayError::Transport(format!(
            "invalid credential expiration: {}",
            credentials.expiration
        ))
    })?;
    Ok(RoleCredentials {
        access_key_id: credentials.access_key_id,
        secret_access_key: credentials.secret_access_key,
        session_token: credentials.session_token,
        expiration,
    })
}

impl CatalogClient for HttpCatalogClient {
    fn list_accounts<'a>(
        &'a self,
        access_token: &'a str,
        next_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<AccountPage>> + Send + 'a>> {
        Box::pin(list_accounts(
            &self.client,
            &self.endpoint,
            access_token,
            next_token,
        ))
    }

    fn list_account_roles<'a>(
        &'a self,
        access_token: &'a str,
        account_id: &'a str,
        next_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<RolePage>> + Send + 'a>> {
        Box::pin(list_account_roles(
            &self.client,
            &self.endpoint,
            access_token,
            account_id,
            next_token,
        ))
    }

    fn get_role_credentials<'a>(
        &'a self,
        access_token: &'a str,
        account_id: &'a str,
        role_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RoleCredentials>> + Send + 'a>> {
        Box::pin(get_role_credentials(
            &self.client,
            &self.endpoint,
            access_token,
            account_id,
            role_name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_error_body_deserializes_into_identifier_fields() {
        let wire: CreateTokenWire = serde_json::from_str(
            r#"{"error":"authorization_pending","error_description":"user has not approved"}"#,
        )
        .expect("wire");
        let response: CreateTokenResponse = wire.into();
        assert_eq!(response.error.as_deref(), Some("authorization_pending"));
        assert_eq!(
            response.error_description.as_deref(),
            Some("user has not approved")
        );
        assert!(response.access_token.is_none());
    }

    #[test]
    fn token_success_body_deserializes_token_and_expiry() {
        let wire: CreateTokenWire = serde_json::from_str(
            r#"{"accessToken":"bearer","tokenType":"Bearer","expiresIn":28800}"#,
        )
        .expect("wire");
        assert_eq!(wire.access_token.as_deref(), Some("bearer"));
        assert_eq!(wire.expires_in, Some(28800));
    }

    #[test]
    fn device_authorization_body_deserializes_optional_fields() {
        let wire: DeviceAuthorizationWire = serde_json::from_str(
            r#"{
              "deviceCode": "dev-code",
              "userCode": "ABCD-1234",
              "verificationUri": "https://device.sso.eu-west-1.amazonaws.com/",
              "verificationUriComplete": "https://device.sso.eu-west-1.amazonaws.com/?user_code=ABCD-1234",
              "expiresIn": 600,
              "interval": 1
            }"#,
        )
        .expect("wire");
        assert_eq!(wire.device_code, "dev-code");
        assert_eq!(wire.interval, Some(1));
        assert!(wire.verification_uri_complete.is_some());

        let minimal: DeviceAuthorizationWire = serde_json::from_str(
            r#"{"deviceCode":"d","userCode":"u","verificationUri":"https://v"}"#,
        )
        .expect("minimal wire");
        assert!(minimal.interval.is_none());
        assert!(minimal.verification_uri_complete.is_none());
    }

    #[test]
    fn account_list_body_deserializes_page_and_token() {
        let wire: AccountListWire = serde_json::from_str(
            r#"{
              "accountList": [
                {"accountId":"111111111111","accountName":"Production","emailAddress":"root@example.com"}
              ],
              "nextToken": "page-2"
            }"#,
        )
        .expect("wire");
        assert_eq!(wire.account_list.len(), 1);
        assert_eq!(wire.account_list[0].account_id, "111111111111");
        assert_eq!(wire.next_token.as_deref(), Some("page-2"));
    }

    #[test]
    fn role_credentials_expiration_parses_from_epoch_millis() {
        let wire: GetRoleCredentialsWire = serde_json::from_str(
            r#"{
              "roleCredentials": {
                "accessKeyId": "AKIAEXAMPLE",
                "secretAccessKey": "secret",
                "sessionToken": "session",
                "expiration": 1592388128000
              }
            }"#,
        )
        .expect("wire");
        let expiration =
            DateTime::from_timestamp_millis(wire.role_credentials.expiration).expect("timestamp");
        assert_eq!(expiration.timestamp(), 1_592_388_128);
    }

    #[test]
    fn register_request_serializes_camel_case() {
        let body = serde_json::to_string(&RegisterClientRequest {
            client_name: CLIENT_NAME,
            client_type: CLIENT_TYPE,
        })
        .expect("body");
        assert_eq!(body, r#"{"clientName":"gangway","clientType":"public"}"#);
    }

    #[test]
    fn endpoints_are_normalized_without_trailing_slash() {
        let oidc = HttpOidcClient::with_endpoint("https://oidc.eu-west-1.amazonaws.com/")
            .expect("client");
        assert_eq!(oidc.endpoint, "https://oidc.eu-west-1.amazonaws.com");

        let portal = HttpCatalogClient::new("eu-west-1").expect("client");
        assert_eq!(portal.endpoint, "https://portal.sso.eu-west-1.amazonaws.com");
    }
}
