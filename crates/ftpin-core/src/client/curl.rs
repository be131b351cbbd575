//! libcurl-backed `FtpClient`.
//!
//! One `Easy` handle is one control connection: libcurl keeps it alive
//! between requests and reuses it as long as the host, port and credentials
//! stay the same. Directory state lives on our side; every request addresses
//! an absolute path (`ftp://host//abs/path`, the doubled slash makes libcurl
//! start with `CWD /`).

use std::ffi::CString;
use std::io::{self, Write};

use ::curl::easy::{Easy, InfoType};
use libc::c_long;
use url::Url;

use super::{list_parse, resolve_path, Endpoint, FtpClient, RemoteEntry, Security, TransferType};
use crate::error::{FtpError, FtpResult};
use crate::progress::TransferListener;
use crate::tls::VerifyMode;

pub struct CurlFtpClient {
    easy: Option<Easy>,
    endpoint: Option<Endpoint>,
    cwd: Option<String>,
    // keeps the materialized CA bundle alive as long as the handle uses it
    ca_file: Option<tempfile::NamedTempFile>,
}

impl CurlFtpClient {
    pub fn new() -> Self {
        Self {
            easy: None,
            endpoint: None,
            cwd: None,
            ca_file: None,
        }
    }

    fn parts(&mut self) -> FtpResult<(&mut Easy, &Endpoint)> {
        match (self.easy.as_mut(), self.endpoint.as_ref()) {
            (Some(easy), Some(endpoint)) => Ok((easy, endpoint)),
            _ => Err(FtpError::Protocol("not connected".to_string())),
        }
    }

    /// Run one request against `url` with the body discarded. Returns the
    /// server replies seen on the control channel.
    fn probe(&mut self, url: &Url) -> FtpResult<Vec<String>> {
        let (easy, endpoint) = self.parts()?;
        easy.url(url.as_str()).map_err(|e| map_curl_error(easy, endpoint, e))?;
        easy.nobody(true).map_err(|e| map_curl_error(easy, endpoint, e))?;
        easy.resume_from(0).map_err(|e| map_curl_error(easy, endpoint, e))?;
        let mut replies = Vec::new();
        let result = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|line| {
                    replies.push(String::from_utf8_lossy(line).trim_end().to_string());
                    true
                })
                .and_then(|_| transfer.perform())
        };
        let reset = easy.nobody(false);
        result.map_err(|e| map_curl_error(easy, endpoint, e))?;
        reset.map_err(|e| map_curl_error(easy, endpoint, e))?;
        Ok(replies)
    }

    fn url_for(&self, path: &str, directory: bool) -> FtpResult<Url> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| FtpError::Protocol("not connected".to_string()))?;
        build_url(endpoint, path, directory)
    }

    fn cwd_or_root(&self) -> &str {
        self.cwd.as_deref().unwrap_or("/")
    }
}

impl Default for CurlFtpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FtpClient for CurlFtpClient {
    fn connect(&mut self, endpoint: &Endpoint) -> FtpResult<()> {
        let mut easy = Easy::new();
        self.ca_file = configure_handle(&mut easy, endpoint)?;
        self.easy = Some(easy);
        self.endpoint = Some(endpoint.clone());
        self.cwd = None;
        Ok(())
    }

    fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        let (easy, endpoint) = self.parts()?;
        easy.username(user).map_err(|e| map_curl_error(easy, endpoint, e))?;
        easy.password(password).map_err(|e| map_curl_error(easy, endpoint, e))?;
        Ok(())
    }

    fn set_passive(&mut self, passive: bool) -> FtpResult<()> {
        let (easy, endpoint) = self.parts()?;
        // "-" lets libcurl pick the control connection's local address for PORT/EPRT
        let port = if passive { None } else { Some("-") };
        setopt_str(easy, curl_sys::CURLOPT_FTPPORT, port).map_err(|e| map_curl_error(easy, endpoint, e))
    }

    fn set_type(&mut self, transfer_type: TransferType) -> FtpResult<()> {
        let (easy, endpoint) = self.parts()?;
        let text = matches!(transfer_type, TransferType::Ascii) as c_long;
        setopt_long(easy, curl_sys::CURLOPT_TRANSFERTEXT, text).map_err(|e| map_curl_error(easy, endpoint, e))
    }

    fn is_compression_supported(&self) -> bool {
        // libcurl never negotiates MODE Z
        false
    }

    fn set_compression(&mut self, enabled: bool) -> FtpResult<()> {
        if enabled {
            return Err(FtpError::Protocol("MODE Z is not supported".to_string()));
        }
        Ok(())
    }

    fn current_directory(&mut self) -> FtpResult<String> {
        if let Some(cwd) = &self.cwd {
            return Ok(cwd.clone());
        }
        // a fresh connection answers PWD right after login
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| FtpError::Protocol("not connected".to_string()))?;
        let url = base_url(endpoint)?;
        let replies = self.probe(&url)?;
        let home = replies
            .iter()
            .find_map(|line| parse_pwd_reply(line))
            .unwrap_or_else(|| "/".to_string());
        self.cwd = Some(home.clone());
        Ok(home)
    }

    fn change_directory(&mut self, path: &str) -> FtpResult<()> {
        let target = resolve_path(self.cwd_or_root(), path);
        let url = self.url_for(&target, true)?;
        self.probe(&url)?;
        tracing::trace!(directory = %target, "CWD");
        self.cwd = Some(target);
        Ok(())
    }

    fn list(&mut self) -> FtpResult<Vec<RemoteEntry>> {
        let dir = self.cwd_or_root().to_string();
        let url = self.url_for(&dir, true)?;
        let (easy, endpoint) = self.parts()?;
        easy.url(url.as_str()).map_err(|e| map_curl_error(easy, endpoint, e))?;
        easy.resume_from(0).map_err(|e| map_curl_error(easy, endpoint, e))?;
        let mut body = Vec::new();
        let result = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .and_then(|_| transfer.perform())
        };
        result.map_err(|e| map_curl_error(easy, endpoint, e))?;
        let entries = list_parse::parse_list_output(&String::from_utf8_lossy(&body));
        tracing::debug!(directory = %dir, entries = entries.len(), "LIST");
        Ok(entries)
    }

    fn download(
        &mut self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        listener: &mut dyn TransferListener,
    ) -> FtpResult<u64> {
        let target = resolve_path(self.cwd_or_root(), path);
        let url = self.url_for(&target, false)?;
        let (easy, endpoint) = self.parts()?;
        easy.url(url.as_str()).map_err(|e| map_curl_error(easy, endpoint, e))?;
        easy.resume_from(offset).map_err(|e| map_curl_error(easy, endpoint, e))?;

        let mut written = 0u64;
        let mut sink_error: Option<FtpError> = None;
        listener.started();
        let result = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| match write_chunk(sink, data) {
                    Ok(()) => {
                        written += data.len() as u64;
                        listener.transferred(data.len());
                        Ok(data.len())
                    }
                    Err(e) => {
                        sink_error = Some(e);
                        // short count aborts the transfer
                        Ok(0)
                    }
                })
                .and_then(|_| transfer.perform())
        };

        match (result, sink_error) {
            (_, Some(e)) => {
                if e.is_reader_closed() {
                    listener.aborted();
                } else {
                    listener.failed();
                }
                Err(e)
            }
            (Err(e), None) => {
                listener.failed();
                Err(map_curl_error(easy, endpoint, e))
            }
            (Ok(()), None) => {
                listener.completed();
                Ok(written)
            }
        }
    }

    fn disconnect(&mut self) -> FtpResult<()> {
        // dropping the handle sends QUIT and closes the connection
        self.easy = None;
        self.cwd = None;
        self.ca_file = None;
        Ok(())
    }
}

fn write_chunk(sink: &mut dyn Write, mut data: &[u8]) -> FtpResult<()> {
    while !data.is_empty() {
        match sink.write(data) {
            Ok(0) => return Err(FtpError::ReaderClosed),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(FtpError::from_io(e)),
        }
    }
    Ok(())
}

fn configure_handle(easy: &mut Easy, endpoint: &Endpoint) -> FtpResult<Option<tempfile::NamedTempFile>> {
    let tls_err = |e: ::curl::Error| FtpError::Tls(e.to_string());
    let setup_err = |e: ::curl::Error| FtpError::transport_with("curl setup failed", e);

    easy.connect_timeout(endpoint.timeouts.connect).map_err(setup_err)?;
    easy.low_speed_limit(1).map_err(setup_err)?;
    easy.low_speed_time(endpoint.timeouts.low_speed).map_err(setup_err)?;
    easy.verbose(true).map_err(setup_err)?;
    easy.debug_function(log_control_channel).map_err(setup_err)?;

    if !endpoint.security.is_tls() {
        return Ok(None);
    }
    if endpoint.security == Security::Explicit {
        let all = curl_sys::CURLUSESSL_ALL as c_long;
        setopt_long(easy, curl_sys::CURLOPT_USE_SSL, all).map_err(tls_err)?;
    }
    easy.ssl_verify_peer(endpoint.tls.verifies_peer()).map_err(tls_err)?;
    easy.ssl_verify_host(endpoint.tls.verify_hostname).map_err(tls_err)?;
    match &endpoint.tls.verify {
        VerifyMode::Certificates(bundle) => {
            let file = write_ca_file(bundle.pem())?;
            easy.cainfo(file.path()).map_err(tls_err)?;
            Ok(Some(file))
        }
        VerifyMode::PlatformDefault | VerifyMode::NoVerify => Ok(None),
    }
}

fn write_ca_file(pem: &str) -> FtpResult<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("ftpin-ca-")
        .suffix(".pem")
        .tempfile()
        .map_err(|e| FtpError::Tls(format!("failed to write CA bundle: {}", e)))?;
    file.write_all(pem.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| FtpError::Tls(format!("failed to write CA bundle: {}", e)))?;
    Ok(file)
}

fn log_control_channel(kind: InfoType, data: &[u8]) {
    match kind {
        InfoType::HeaderOut => {
            for line in String::from_utf8_lossy(data).lines() {
                tracing::debug!("> {}", mask_password(line));
            }
        }
        InfoType::HeaderIn => {
            for line in String::from_utf8_lossy(data).lines() {
                tracing::debug!("< {}", line);
            }
        }
        InfoType::Text => {
            tracing::trace!("{}", String::from_utf8_lossy(data).trim_end());
        }
        _ => {}
    }
}

pub(crate) fn mask_password(line: &str) -> String {
    match line.get(..5) {
        Some(cmd) if cmd.eq_ignore_ascii_case("PASS ") => format!("{}****", cmd),
        _ => line.to_string(),
    }
}

/// `257 "/home/ftp" is the current directory` -> `/home/ftp`. Doubled quotes
/// inside the name stand for one quote.
pub(crate) fn parse_pwd_reply(line: &str) -> Option<String> {
    let rest = line.strip_prefix("257")?;
    let start = rest.find('"')? + 1;
    let mut out = String::new();
    let mut chars = rest[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                out.push('"');
                continue;
            }
            return Some(out);
        }
        out.push(c);
    }
    None
}

fn base_url(endpoint: &Endpoint) -> FtpResult<Url> {
    let scheme = match endpoint.security {
        Security::Implicit => "ftps",
        Security::Plain | Security::Explicit => "ftp",
    };
    let host = if endpoint.host.contains(':') && !endpoint.host.starts_with('[') {
        format!("[{}]", endpoint.host)
    } else {
        endpoint.host.clone()
    };
    let mut url = Url::parse(&format!("{}://{}/", scheme, host))
        .map_err(|e| FtpError::Protocol(format!("invalid host '{}': {}", endpoint.host, e)))?;
    url.set_port(Some(endpoint.port))
        .map_err(|_| FtpError::Protocol(format!("cannot set port on '{}'", endpoint.host)))?;
    Ok(url)
}

/// URL addressing the absolute `path`. Directories get a trailing slash so
/// libcurl lists or enters them instead of retrieving.
pub(crate) fn build_url(endpoint: &Endpoint, path: &str, directory: bool) -> FtpResult<Url> {
    let mut url = base_url(endpoint)?;
    let mut abs = resolve_path("/", path);
    if directory && !abs.ends_with('/') {
        abs.push('/');
    }
    // '%' must survive literally; set_path percent-encodes the rest
    url.set_path(&format!("/{}", abs.replace('%', "%25")));
    Ok(url)
}

fn setopt_long(easy: &mut Easy, opt: curl_sys::CURLoption, value: c_long) -> Result<(), ::curl::Error> {
    let rc = unsafe { curl_sys::curl_easy_setopt(easy.raw(), opt, value) };
    if rc == curl_sys::CURLE_OK {
        Ok(())
    } else {
        Err(::curl::Error::new(rc))
    }
}

fn setopt_str(easy: &mut Easy, opt: curl_sys::CURLoption, value: Option<&str>) -> Result<(), ::curl::Error> {
    let value = match value {
        Some(v) => Some(CString::new(v).map_err(|_| ::curl::Error::new(curl_sys::CURLE_BAD_FUNCTION_ARGUMENT))?),
        None => None,
    };
    let ptr = value.as_ref().map_or(std::ptr::null(), |v| v.as_ptr());
    // libcurl copies string options
    let rc = unsafe { curl_sys::curl_easy_setopt(easy.raw(), opt, ptr) };
    if rc == curl_sys::CURLE_OK {
        Ok(())
    } else {
        Err(::curl::Error::new(rc))
    }
}

fn map_curl_error(easy: &mut Easy, endpoint: &Endpoint, e: ::curl::Error) -> FtpError {
    let message = match e.extra_description() {
        Some(extra) => format!("{}: {}", e.description(), extra),
        None => e.description().to_string(),
    };
    if e.is_couldnt_resolve_host() || e.is_couldnt_connect() || e.is_login_denied() {
        return FtpError::Connect {
            host: endpoint.host.clone(),
            port: endpoint.port,
            message,
        };
    }
    if e.is_ssl_connect_error() || e.is_peer_failed_verification() || e.is_ssl_cacert() {
        return FtpError::Tls(message);
    }
    if e.is_remote_access_denied() || e.code() == curl_sys::CURLE_REMOTE_FILE_NOT_FOUND {
        let code = easy.response_code().ok().filter(|c| *c >= 400).unwrap_or(550);
        return FtpError::Command { code, message };
    }
    FtpError::transport_with(message, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Timeouts;
    use crate::tls::TlsPolicy;

    fn endpoint(security: Security, port: u16) -> Endpoint {
        Endpoint {
            host: "ftp.example.com".to_string(),
            port,
            security,
            tls: TlsPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }

    #[test]
    fn missing_remote_file_maps_to_550() {
        let mut easy = Easy::new();
        let ep = endpoint(Security::Plain, 21);
        let e = ::curl::Error::new(curl_sys::CURLE_REMOTE_FILE_NOT_FOUND);
        assert!(matches!(map_curl_error(&mut easy, &ep, e), FtpError::Command { code: 550, .. }));
        let e = ::curl::Error::new(curl_sys::CURLE_COULDNT_CONNECT);
        assert!(matches!(map_curl_error(&mut easy, &ep, e), FtpError::Connect { port: 21, .. }));
        let e = ::curl::Error::new(curl_sys::CURLE_RECV_ERROR);
        assert!(matches!(map_curl_error(&mut easy, &ep, e), FtpError::Transport { .. }));
    }

    #[test]
    fn file_url_uses_absolute_path() {
        let url = build_url(&endpoint(Security::Plain, 21), "/data/a b.csv", false).unwrap();
        assert_eq!(url.as_str(), "ftp://ftp.example.com//data/a%20b.csv");
        let url = build_url(&endpoint(Security::Explicit, 2121), "/x%y", false).unwrap();
        assert_eq!(url.as_str(), "ftp://ftp.example.com:2121//x%25y");
    }

    #[test]
    fn implicit_tls_uses_ftps_scheme() {
        let url = build_url(&endpoint(Security::Implicit, 990), "/data", true).unwrap();
        assert_eq!(url.as_str(), "ftps://ftp.example.com:990//data/");
    }

    #[test]
    fn root_directory_url() {
        let url = build_url(&endpoint(Security::Plain, 21), "/", true).unwrap();
        assert_eq!(url.as_str(), "ftp://ftp.example.com//");
    }

    #[test]
    fn pwd_reply() {
        assert_eq!(
            parse_pwd_reply("257 \"/home/ftp\" is the current directory").as_deref(),
            Some("/home/ftp")
        );
        assert_eq!(
            parse_pwd_reply("257 \"/odd \"\"name\"\"\" created").as_deref(),
            Some("/odd \"name\"")
        );
        assert_eq!(parse_pwd_reply("230 Login successful."), None);
    }

    #[test]
    fn password_is_masked() {
        assert_eq!(mask_password("PASS hunter2"), "PASS ****");
        assert_eq!(mask_password("pass hunter2"), "pass ****");
        assert_eq!(mask_password("USER ftp"), "USER ftp");
    }

    #[test]
    fn commands_before_connect_fail() {
        let mut client = CurlFtpClient::new();
        assert!(matches!(client.set_passive(true), Err(FtpError::Protocol(_))));
        assert!(!client.is_compression_supported());
        assert!(client.set_compression(true).is_err());
        assert!(client.disconnect().is_ok());
    }
}
