//! The immutable request replayed by every worker.

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::Config;
use crate::error::ConfigError;

/// Basic auth credentials.
#[derive(Debug)]
struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    /// Parses `user:password`. The password may itself contain colons.
    fn parse(credentials: &str) -> Result<Self, ConfigError> {
        let (username, password) = credentials
            .split_once(':')
            .ok_or(ConfigError::InvalidCredentials)?;

        Ok(Self {
            username: username.to_owned(),
            password: SecretString::from(password.to_owned()),
        })
    }
}

/// Method, URL, headers, body and credentials of the request sent by every worker.
///
/// The template is built once before the run and shared read-only by all workers.
#[derive(Debug)]
pub struct RequestTemplate {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
    credentials: Option<Credentials>,
}

impl RequestTemplate {
    /// Creates a template for a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            credentials: None,
        }
    }

    /// Validates the request settings of `config` and builds the template from them.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let raw_url = config
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        let url = Url::parse(raw_url).map_err(|source| ConfigError::InvalidUrl {
            url: raw_url.to_owned(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_owned()));
        }

        let method = Method::from_bytes(config.method.as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(config.method.clone()))?;
        let content_type = HeaderValue::from_str(&config.content_type)
            .map_err(|_| ConfigError::InvalidContentType(config.content_type.clone()))?;

        let mut template = Self::new(method, url).body(config.body.clone());
        template.headers.insert(CONTENT_TYPE, content_type);
        if let Some(auth) = &config.auth {
            template.credentials = Some(Credentials::parse(auth.expose_secret().as_str())?);
        }

        Ok(template)
    }

    /// Sets the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Prepares a fresh request from this template.
    ///
    /// The body is reference counted, so this does not copy it.
    pub fn build(&self, client: &Client) -> RequestBuilder {
        let mut request = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());

        if !self.body.is_empty() {
            request = request.body(self.body.clone());
        }
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(
                &credentials.username,
                Some(credentials.password.expose_secret()),
            );
        }

        request
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::AUTHORIZATION;
    use secrecy::SecretBox;

    use super::*;
    use crate::config::ConfigSecret;

    fn config(url: &str) -> Config {
        Config {
            url: Some(url.to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_to_plain_get() {
        let template = RequestTemplate::from_config(&config("http://localhost:8888/")).unwrap();

        assert_eq!(template.method(), Method::GET);
        assert_eq!(template.url().as_str(), "http://localhost:8888/");
        assert_eq!(template.headers()[CONTENT_TYPE], "text/plain");

        let request = template.build(&Client::new()).build().unwrap();
        assert!(request.body().is_none());
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn builds_full_request() {
        let config = Config {
            method: "POST".into(),
            content_type: "application/json".into(),
            body: r#"{"hello":"world"}"#.into(),
            auth: Some(SecretBox::new(Box::new(ConfigSecret::from("aladdin:open:sesame")))),
            ..config("https://example.com/api")
        };
        let template = RequestTemplate::from_config(&config).unwrap();
        let request = template.build(&Client::new()).build().unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            request.body().and_then(|body| body.as_bytes()),
            Some(&br#"{"hello":"world"}"#[..])
        );
        // base64("aladdin:open:sesame")
        assert_eq!(
            request.headers()[AUTHORIZATION],
            "Basic YWxhZGRpbjpvcGVuOnNlc2FtZQ=="
        );
    }

    #[test]
    fn missing_url() {
        let result = RequestTemplate::from_config(&Config::default());
        assert!(matches!(result, Err(ConfigError::MissingUrl)));

        let result = RequestTemplate::from_config(&config(""));
        assert!(matches!(result, Err(ConfigError::MissingUrl)));
    }

    #[test]
    fn invalid_url() {
        let result = RequestTemplate::from_config(&config("not a url"));
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));

        let result = RequestTemplate::from_config(&config("ftp://example.com/"));
        assert!(matches!(result, Err(ConfigError::UnsupportedScheme(scheme)) if scheme == "ftp"));
    }

    #[test]
    fn invalid_method_and_content_type() {
        let result = RequestTemplate::from_config(&Config {
            method: "GE T".into(),
            ..config("http://localhost/")
        });
        assert!(matches!(result, Err(ConfigError::InvalidMethod(_))));

        let result = RequestTemplate::from_config(&Config {
            content_type: "text/plain\n".into(),
            ..config("http://localhost/")
        });
        assert!(matches!(result, Err(ConfigError::InvalidContentType(_))));
    }

    #[test]
    fn credentials_need_a_colon() {
        let result = RequestTemplate::from_config(&Config {
            auth: Some(SecretBox::new(Box::new(ConfigSecret::from("aladdin")))),
            ..config("http://localhost/")
        });
        assert!(matches!(result, Err(ConfigError::InvalidCredentials)));
    }
}
