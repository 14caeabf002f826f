use crate::Result;
use crate::error::Error;

/// A URL split into the components the URL-shape policies rewrite.
///
/// Unlike [`url::Url`] this also represents partial URLs, such as a
/// path-only `/items?x=1` whose host is filled in later by a
/// [`HostConfig`](crate::policy::HostConfig) policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlParts {
    scheme: Option<String>,
    userinfo: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|item| item.is_ascii_alphanumeric() || matches!(item, '+' | '-' | '.'))
}

fn is_valid_host(host: &str) -> bool {
    if let Some(inner) = host.strip_prefix('[') {
        return inner
            .strip_suffix(']')
            .is_some_and(|address| address.parse::<std::net::Ipv6Addr>().is_ok());
    }
    !host.is_empty()
        && !host.chars().any(|item| {
            item.is_whitespace() || item.is_control() || "/?#@[]:\\%<>^|\"".contains(item)
        })
}

impl UrlParts {
    pub fn parse(url: &str) -> Result<Self> {
        let (rest, fragment) = match url.split_once('#') {
            Some((left, right)) => (left, Some(right.to_owned())),
            None => (url, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((left, right)) => (left, Some(right.to_owned())),
            None => (rest, None),
        };

        let (scheme, after_scheme) = match rest.split_once("://") {
            Some((scheme, after)) => {
                if !is_valid_scheme(scheme) {
                    return Err(Error::malformed_url(url, format!("invalid scheme {scheme:?}")));
                }
                (Some(scheme.to_ascii_lowercase()), Some(after))
            }
            None => (None, rest.strip_prefix("//")),
        };

        let mut parts = Self {
            scheme,
            query,
            fragment,
            ..Self::default()
        };

        let Some(after_scheme) = after_scheme else {
            parts.path = rest.to_owned();
            return Ok(parts);
        };

        let (authority, path) = match after_scheme.find('/') {
            Some(index) => after_scheme.split_at(index),
            None => (after_scheme, ""),
        };
        parts.path = path.to_owned();

        let host_port = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => {
                parts.userinfo = Some(userinfo.to_owned());
                host_port
            }
            None => authority,
        };

        let (host, port) = if host_port.starts_with('[') {
            match host_port.find(']') {
                Some(end) => {
                    let (host, tail) = host_port.split_at(end + 1);
                    (host, tail.strip_prefix(':'))
                }
                None => return Err(Error::malformed_url(url, "unterminated ipv6 host")),
            }
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (host_port, None),
            }
        };

        if !host.is_empty() {
            if !is_valid_host(host) {
                return Err(Error::malformed_url(url, format!("invalid host {host:?}")));
            }
            parts.host = Some(host.to_ascii_lowercase());
        }
        if let Some(port) = port.filter(|port| !port.is_empty()) {
            let port = port
                .parse::<u16>()
                .map_err(|_| Error::malformed_url(url, format!("invalid port {port:?}")))?;
            parts.port = Some(port);
        }

        Ok(parts)
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn set_scheme(&mut self, scheme: &str) -> Result<()> {
        if !is_valid_scheme(scheme) {
            return Err(Error::malformed_url(
                &self.to_string(),
                format!("invalid scheme {scheme:?}"),
            ));
        }
        self.scheme = Some(scheme.to_ascii_lowercase());
        Ok(())
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn set_host(&mut self, host: &str) -> Result<()> {
        if !is_valid_host(host) {
            return Err(Error::malformed_url(
                &self.to_string(),
                format!("invalid host {host:?}"),
            ));
        }
        self.host = Some(host.to_ascii_lowercase());
        Ok(())
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = Some(port);
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn append_query_pair(&mut self, name: &str, value: &str) {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.append_pair(name, value);
        let pair = serializer.finish();
        self.query = Some(match self.query.take().filter(|query| !query.is_empty()) {
            Some(existing) => format!("{existing}&{pair}"),
            None => pair,
        });
    }

    /// Has both a scheme and a host, so it can be handed to a transport.
    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some() && self.host.is_some()
    }

    /// Serializes the components, checking that an absolute result is a
    /// URL a transport would accept.
    pub fn to_url_string(&self) -> Result<String> {
        let text = self.to_string();
        if self.is_absolute() {
            url::Url::parse(&text)
                .map_err(|source| Error::malformed_url(&text, source.to_string()))?;
        }
        Ok(text)
    }
}

impl std::fmt::Display for UrlParts {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_authority = self.scheme.is_some() || self.host.is_some() || self.port.is_some();
        if let Some(scheme) = &self.scheme {
            write!(formatter, "{scheme}://")?;
        } else if has_authority {
            formatter.write_str("//")?;
        }
        if let Some(userinfo) = &self.userinfo {
            write!(formatter, "{userinfo}@")?;
        }
        if let Some(host) = &self.host {
            formatter.write_str(host)?;
        }
        if let Some(port) = self.port {
            write!(formatter, ":{port}")?;
        }
        if has_authority && !self.path.is_empty() && !self.path.starts_with('/') {
            formatter.write_str("/")?;
        }
        formatter.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(formatter, "?{query}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(formatter, "#{fragment}")?;
        }
        Ok(())
    }
}
