use url::Url;
use uuid::Uuid;

/// Convenience wrapper for URL generation functions.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path for all certificate-related actions.
    pub(crate) certificates_path: String,

    /// Prefix for all certificate-related actions.
    certificates_prefix: String,

    /// Base for placeholder document URLs when the document pipeline
    /// is unavailable.
    documents_fallback: Url,
}

impl Urls {
    /// Create a new instance. `certificates_prefix` should *not* include a
    /// trailing slash.
    pub fn new(
        base: impl AsRef<str>,
        certificates_prefix: impl Into<String>,
        documents_fallback: impl AsRef<str>,
    ) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));
        let certificates_path = certificates_prefix.into();
        let certificates_prefix = format!("{}/", certificates_path);
        let documents_fallback = Url::parse(documents_fallback.as_ref())
            .unwrap_or_else(|_| panic!("parse {} as URL", documents_fallback.as_ref()));

        Urls {
            base,
            certificates_path,
            certificates_prefix,
            documents_fallback,
        }
    }

    pub fn certificates(&self) -> Url {
        self.base
            .join(&self.certificates_prefix)
            .expect("get certificates URL")
    }

    pub fn certificate(&self, id: &Uuid) -> Url {
        let id = format!("{}", id);
        self.certificates()
            .join(&id)
            .unwrap_or_else(|_| panic!("get URL for certificate {}", id))
    }

    /// The placeholder URL recorded when a document could not be
    /// rendered or stored.
    pub fn fallback_document(&self, name: &str) -> Url {
        self.documents_fallback
            .join(name)
            .unwrap_or_else(|_| panic!("get fallback URL for document {}", name))
    }
}
