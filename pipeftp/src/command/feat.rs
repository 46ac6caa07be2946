use crate::types::{Features, Response};
use crate::{FtpError, FtpResult};

/// Build the feature table out of a framed FEAT reply ([RFC 2389, 3.2](https://datatracker.ietf.org/doc/html/rfc2389#section-3.2)).
///
/// A single line `211` reply means the server has no extensions; a `211-` block carries one
/// feature per line between the opening and the closing line. Any other code is a [`FtpError::BadResponse`].
pub fn parse_features(response: &Response) -> FtpResult<Features> {
    if response.code != 211 {
        error!("FEAT reply has unexpected code {}", response.code);
        return Err(FtpError::BadResponse);
    }
    let mut features = Features::new();
    if !response.multiline {
        debug!("server advertises no features");
        return Ok(features);
    }
    let lines: Vec<&str> = response.lines().collect();
    // first and last lines are the `211-` opening and the `211 ` closing line
    let body = match lines.len() {
        0..=2 => &[][..],
        n => &lines[1..n - 1],
    };
    for line in body {
        parse_feature(line, &mut features);
    }
    debug!("Server supports {} features", features.len());
    Ok(features)
}

/// ` LABEL [params]`; the leading space is required by the RFC but not enforced
fn parse_feature(line: &str, features: &mut Features) {
    if !line.starts_with(' ') {
        warn!("feature line without leading space: {line}");
    }
    let line = line.trim();
    let (label, params) = match line.split_once(' ') {
        Some((label, params)) => (label, Some(params.trim().to_string())),
        None => (line, None),
    };
    if label.is_empty() {
        return;
    }
    let params = params.filter(|p| !p.is_empty());
    trace!("feature {label}: {params:?}");
    features.insert(label.to_uppercase(), params);
}
