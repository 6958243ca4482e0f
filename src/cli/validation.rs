//! CLI argument validation functions
//!
//! Value parsers for arguments that clap cannot check on its own.

use std::fs;
use std::path::PathBuf;

use reqwest::Url;

use crate::jobs::parse_schedule_time;

/// Validate port number is within valid range (1-65535)
pub fn validate_port(port_str: &str) -> Result<u16, String> {
    let port: u16 = port_str.parse().map_err(|_| {
        format!(
            "Port must be a valid number between 1 and 65535, got: '{}'",
            port_str
        )
    })?;

    if port == 0 {
        return Err("Port must be between 1 and 65535. Port 0 is not allowed.".to_string());
    }

    Ok(port)
}

/// Validate that a file path is accessible (exists and is readable)
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(format!("Configuration file does not exist: '{}'", path_str));
    }
    if !path.is_file() {
        return Err(format!("Configuration path is not a file: '{}'", path_str));
    }

    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!("Cannot read configuration file '{}': {}", path_str, e)),
    }
}

/// Validate host address format (basic validation)
pub fn validate_host_address(host_str: &str) -> Result<String, String> {
    let host = host_str.trim();

    if host.is_empty() {
        return Err("Host address cannot be empty".to_string());
    }
    if host.contains(' ') {
        return Err("Host address cannot contain spaces".to_string());
    }
    if host == "localhost" || host == "0.0.0.0" || host.starts_with("127.") {
        return Ok(host.to_string());
    }

    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() == 4 {
            for part in parts {
                if part.parse::<u8>().is_err() {
                    return Err(format!("Invalid IPv4 address format: '{}'", host_str));
                }
            }
            return Ok(host.to_string());
        }
    }

    if host.len() > 253 {
        return Err("Host address is too long (maximum 253 characters)".to_string());
    }

    Ok(host.to_string())
}

/// Base URL of a running instance; only http and https are accepted
pub fn validate_api_url(url_str: &str) -> Result<Url, String> {
    let url = Url::parse(url_str.trim()).map_err(|e| format!("Invalid API URL '{}': {}", url_str, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("API URL must use http or https, got '{}'", other)),
    }
}

/// `HH:MM` or `HH:MM:SS`; passed on unchanged once it parses
pub fn validate_schedule_time(time_str: &str) -> Result<String, String> {
    parse_schedule_time(time_str)?;
    Ok(time_str.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_validation() {
        for port in ["1", "80", "3000", "65535"] {
            assert!(validate_port(port).is_ok(), "Port {} should be valid", port);
        }
        for port in ["0", "65536", "abc", "-1", ""] {
            assert!(validate_port(port).is_err(), "Port {} should be invalid", port);
        }
    }

    #[test]
    fn test_host_validation_valid_hosts() {
        let valid_hosts = ["localhost", "127.0.0.1", "0.0.0.0", "192.168.1.1", "batch.internal"];
        for host in valid_hosts {
            assert!(validate_host_address(host).is_ok(), "Host {} should be valid", host);
        }
    }

    #[test]
    fn test_host_validation_invalid_hosts() {
        let long = "x".repeat(300);
        let invalid_hosts = ["", "   ", "host with spaces", "999.999.999.999", long.as_str()];
        for host in invalid_hosts {
            assert!(validate_host_address(host).is_err(), "Host '{}' should be invalid", host);
        }
    }

    #[test]
    fn test_api_url_validation() {
        assert!(validate_api_url("http://127.0.0.1:3000").is_ok());
        assert!(validate_api_url("https://batch.example.com/").is_ok());
        assert!(validate_api_url("ftp://batch.example.com").is_err());
        assert!(validate_api_url("not a url").is_err());
    }

    #[test]
    fn test_schedule_time_validation() {
        assert_eq!(validate_schedule_time("02:00").unwrap(), "02:00");
        assert!(validate_schedule_time("02:00:30").is_ok());
        assert!(validate_schedule_time("25:00").is_err());
        assert!(validate_schedule_time("noon").is_err());
    }
}
