//! Rolling challenge renderer.
//!
//! Every call recomputes the auth code from the elapsed-time bucket, so a
//! link shown to the user stops verifying once its bucket has passed.

use std::time::Duration;

use serde::Serialize;
use tracing::trace;
use url::Url;

use verilink_core::{Interaction, OperationKind};

use crate::auth_code::auth_code;
use crate::error::ChallengeError;
use crate::qr::qr_data_uri;

const LINK_VERSION: &str = "1.0";

/// Where the link is meant to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLinkType {
    /// Opened directly on the same device.
    Web2App,
    /// Scanned from another screen.
    Qr,
}

impl DeviceLinkType {
    fn as_param(&self) -> &'static str {
        match self {
            Self::Web2App => "Web2App",
            Self::Qr => "QR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub base_url: String,
    /// Width of one elapsed-time bucket.
    pub bucket: Duration,
    pub lang: String,
    /// Pixel size of one QR module.
    pub qr_module_px: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "https://smart-id.com/device-link/".into(),
            bucket: Duration::from_secs(1),
            lang: "eng".into(),
            qr_module_px: 6,
        }
    }
}

/// What the renderer needs to know about a session.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeInput<'a> {
    pub kind: OperationKind,
    pub session_token: &'a str,
    pub session_secret: &'a str,
    pub interactions: &'a [Interaction],
}

/// Display artifacts for one elapsed-time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedChallenge {
    pub deep_link: String,
    /// The link encoded in the QR code.
    pub qr_link: String,
    /// PNG data URI of the QR code.
    pub qr_code: String,
    pub auth_code: String,
    /// Elapsed seconds, aligned down to the bucket.
    pub elapsed_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ChallengeRenderer {
    base_url: Url,
    bucket_secs: u64,
    lang: String,
    qr_module_px: u32,
}

impl ChallengeRenderer {
    pub fn new(config: RendererConfig) -> Result<Self, ChallengeError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ChallengeError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        let bucket_secs = config.bucket.as_secs();
        if bucket_secs == 0 {
            return Err(ChallengeError::InvalidBucket);
        }
        Ok(Self {
            base_url,
            bucket_secs,
            lang: config.lang,
            qr_module_px: config.qr_module_px,
        })
    }

    /// Align `elapsed` down to the start of its bucket, in seconds.
    pub fn bucket_start(&self, elapsed: Duration) -> u64 {
        elapsed.as_secs() / self.bucket_secs * self.bucket_secs
    }

    /// Render the deep link and QR code for `input` at `elapsed` since acceptance.
    ///
    /// Pure: identical inputs in the same bucket produce identical output.
    pub fn render(
        &self,
        input: &ChallengeInput<'_>,
        elapsed: Duration,
    ) -> Result<RenderedChallenge, ChallengeError> {
        let elapsed_seconds = self.bucket_start(elapsed);
        let code = auth_code(
            input.session_secret,
            input.kind,
            elapsed_seconds,
            input.interactions,
        )?;

        let deep_link = self.link(input, DeviceLinkType::Web2App, elapsed_seconds, &code);
        let qr_link = self.link(input, DeviceLinkType::Qr, elapsed_seconds, &code);
        let qr_code = qr_data_uri(&qr_link, self.qr_module_px)?;
        trace!(kind = %input.kind, elapsed_seconds, "Rendered challenge");

        Ok(RenderedChallenge {
            deep_link,
            qr_link,
            qr_code,
            auth_code: code,
            elapsed_seconds,
        })
    }

    fn link(
        &self,
        input: &ChallengeInput<'_>,
        link_type: DeviceLinkType,
        elapsed_seconds: u64,
        code: &str,
    ) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("version", LINK_VERSION)
            .append_pair("sessionToken", input.session_token)
            .append_pair("deviceLinkType", link_type.as_param())
            .append_pair("sessionType", input.kind.link_code())
            .append_pair("elapsedSeconds", &elapsed_seconds.to_string())
            .append_pair("lang", &self.lang)
            .append_pair("authCode", code);
        url.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHMtMDEyMzQ1Njc4OQ==";

    fn interactions() -> Vec<Interaction> {
        vec![Interaction::DisplayTextAndPin { text: "Log in?".into() }]
    }

    fn param(link: &str, name: &str) -> String {
        Url::parse(link)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    fn renderer(bucket_secs: u64) -> ChallengeRenderer {
        ChallengeRenderer::new(RendererConfig {
            bucket: Duration::from_secs(bucket_secs),
            qr_module_px: 2,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn different_buckets_different_codes_same_token() {
        let pins = interactions();
        let input = ChallengeInput {
            kind: OperationKind::Authentication,
            session_token: "token-123",
            session_secret: SECRET,
            interactions: &pins,
        };
        let r = renderer(1);
        let first = r.render(&input, Duration::from_millis(1_200)).unwrap();
        let second = r.render(&input, Duration::from_millis(2_300)).unwrap();

        assert_ne!(first.auth_code, second.auth_code);
        assert_ne!(param(&first.deep_link, "authCode"), param(&second.deep_link, "authCode"));
        assert_eq!(param(&first.deep_link, "sessionToken"), "token-123");
        assert_eq!(param(&second.deep_link, "sessionToken"), "token-123");
    }

    #[test]
    fn same_bucket_is_deterministic() {
        let pins = interactions();
        let input = ChallengeInput {
            kind: OperationKind::Signature,
            session_token: "t",
            session_secret: SECRET,
            interactions: &pins,
        };
        let r = renderer(5);
        let a = r.render(&input, Duration::from_millis(5_100)).unwrap();
        let b = r.render(&input, Duration::from_millis(9_900)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.elapsed_seconds, 5);
    }

    #[test]
    fn both_links_carry_the_same_code() {
        let pins = interactions();
        let input = ChallengeInput {
            kind: OperationKind::CertificateChoice,
            session_token: "t",
            session_secret: SECRET,
            interactions: &pins,
        };
        let rendered = renderer(1).render(&input, Duration::from_secs(7)).unwrap();

        assert_eq!(param(&rendered.deep_link, "authCode"), rendered.auth_code);
        assert_eq!(param(&rendered.qr_link, "authCode"), rendered.auth_code);
        assert_eq!(param(&rendered.deep_link, "deviceLinkType"), "Web2App");
        assert_eq!(param(&rendered.qr_link, "deviceLinkType"), "QR");
        assert_eq!(param(&rendered.qr_link, "sessionType"), "cert");
        assert_eq!(param(&rendered.qr_link, "elapsedSeconds"), "7");
        assert!(rendered.qr_code.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn rejects_zero_bucket_and_bad_url() {
        let zero = RendererConfig {
            bucket: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(ChallengeRenderer::new(zero).unwrap_err(), ChallengeError::InvalidBucket);

        let bad = RendererConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            ChallengeRenderer::new(bad).unwrap_err(),
            ChallengeError::InvalidBaseUrl(_)
        ));
    }

    #[test]
    fn bad_secret_surfaces_as_error() {
        let pins = interactions();
        let input = ChallengeInput {
            kind: OperationKind::Authentication,
            session_token: "t",
            session_secret: "%%%",
            interactions: &pins,
        };
        assert!(renderer(1).render(&input, Duration::ZERO).is_err());
    }
}
