//! Backend connection settings

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use base64::Engine;

use crate::models::CloudService;
use crate::preferences::keys;
use crate::util::{is_http_url, normalize_text_option, with_trailing_slash};

/// Header map sent with every authenticated request
pub type AuthHeaders = BTreeMap<String, String>;

/// Nextcloud Notes API account
#[derive(Clone, PartialEq, Eq)]
pub struct NextcloudConfig {
    remote_address: String,
    username: String,
    password: String,
    headers: AuthHeaders,
}

/// WebDAV account
#[derive(Clone, PartialEq, Eq)]
pub struct WebdavConfig {
    remote_address: String,
    username: String,
    password: String,
    headers: AuthHeaders,
}

macro_rules! account_config {
    ($name:ident) => {
        impl $name {
            pub fn new(
                remote_address: impl AsRef<str>,
                username: impl Into<String>,
                password: impl Into<String>,
            ) -> Self {
                let username = username.into();
                let password = password.into();
                Self {
                    remote_address: with_trailing_slash(remote_address.as_ref()),
                    headers: basic_auth_headers(&username, &password),
                    username,
                    password,
                }
            }

            /// Base address, always ending with `/`
            #[must_use]
            pub fn remote_address(&self) -> &str {
                &self.remote_address
            }

            #[must_use]
            pub fn username(&self) -> &str {
                &self.username
            }

            #[must_use]
            pub fn password(&self) -> &str {
                &self.password
            }

            #[must_use]
            pub const fn authentication_headers(&self) -> &AuthHeaders {
                &self.headers
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter
                    .debug_struct(stringify!($name))
                    .field("remote_address", &self.remote_address)
                    .field("username", &self.username)
                    .field("password", &"[REDACTED]")
                    .field("headers", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

account_config!(NextcloudConfig);
account_config!(WebdavConfig);

/// Settings for the active backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Nextcloud(NextcloudConfig),
    Webdav(WebdavConfig),
}

impl ProviderConfig {
    #[must_use]
    pub fn remote_address(&self) -> &str {
        match self {
            Self::Nextcloud(config) => config.remote_address(),
            Self::Webdav(config) => config.remote_address(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Nextcloud(config) => config.username(),
            Self::Webdav(config) => config.username(),
        }
    }

    #[must_use]
    pub const fn provider(&self) -> CloudService {
        match self {
            Self::Nextcloud(_) => CloudService::Nextcloud,
            Self::Webdav(_) => CloudService::Webdav,
        }
    }

    #[must_use]
    pub const fn authentication_headers(&self) -> &AuthHeaders {
        match self {
            Self::Nextcloud(config) => config.authentication_headers(),
            Self::Webdav(config) => config.authentication_headers(),
        }
    }

    /// Build the config for `service` from stored credential strings.
    ///
    /// Returns `None` for `Disabled`, when url, username or password is blank,
    /// or when the url is not http(s).
    #[must_use]
    pub fn from_credentials(
        service: CloudService,
        credentials: &HashMap<String, String>,
    ) -> Option<Self> {
        let lookup = |key: &str| normalize_text_option(credentials.get(key).cloned());

        match service {
            CloudService::Disabled => None,
            CloudService::Nextcloud => {
                let url = lookup(keys::NEXTCLOUD_INSTANCE_URL).filter(|url| is_http_url(url))?;
                let username = lookup(keys::NEXTCLOUD_USERNAME)?;
                let password = lookup(keys::NEXTCLOUD_PASSWORD)?;
                Some(Self::Nextcloud(NextcloudConfig::new(url, username, password)))
            }
            CloudService::Webdav => {
                let url = lookup(keys::WEBDAV_INSTANCE_URL).filter(|url| is_http_url(url))?;
                let username = lookup(keys::WEBDAV_USERNAME)?;
                let password = lookup(keys::WEBDAV_PASSWORD)?;
                Some(Self::Webdav(WebdavConfig::new(url, username, password)))
            }
        }
    }
}

impl From<NextcloudConfig> for ProviderConfig {
    fn from(config: NextcloudConfig) -> Self {
        Self::Nextcloud(config)
    }
}

impl From<WebdavConfig> for ProviderConfig {
    fn from(config: WebdavConfig) -> Self {
        Self::Webdav(config)
    }
}

fn basic_auth_headers(username: &str, password: &str) -> AuthHeaders {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    AuthHeaders::from([("Authorization".to_string(), format!("Basic {token}"))])
}
