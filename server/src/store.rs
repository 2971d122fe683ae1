use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::{BoxFuture, FutureExt};
use rusoto_s3::{PutObjectRequest, S3Client, StreamingBody, S3};
use url::{ParseError, Url};

use crate::errors::BackendError;

/// Where rendered certificate documents are kept.
pub trait Store: Send + Sync {
    /// The type of successful result.
    type Output;

    /// The type of raw data.
    type Raw;

    /// Gets the public URL for the given document name.
    fn get_url(&self, name: &str) -> Result<Url, ParseError>;

    /// Saves the given data under the given name.
    fn save(
        &self,
        name: &str,
        content_type: String,
        raw: Self::Raw,
    ) -> BoxFuture<Result<Self::Output, BackendError>>;
}

/// A store that saves its documents to S3.
pub struct S3Store {
    client: Arc<S3Client>,
    acl: String,
    bucket: String,
    cache_control: String,
    base_url: Url,
}

impl S3Store {
    /// Creates a new instance.
    pub fn new(
        client: Arc<S3Client>,
        acl: String,
        bucket: String,
        cache_control: String,
        base_url: Url,
    ) -> Self {
        Self {
            client,
            acl,
            bucket,
            cache_control,
            base_url,
        }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY");
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY");

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME"),
            endpoint: get_variable("S3_ENDPOINT"),
        };

        let bucket = get_variable("S3_BUCKET_NAME");
        let acl = get_variable("BACKEND_S3_ACL");
        let cache_control = get_variable("BACKEND_S3_CACHE_CONTROL");

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        let base_url = Url::parse(&get_variable("S3_BASE_URL")).expect("parse S3_BASE_URL");

        Ok(S3Store::new(client, acl, bucket, cache_control, base_url))
    }
}

impl Store for S3Store {
    type Output = ();
    type Raw = Vec<u8>;

    fn get_url(&self, name: &str) -> Result<Url, ParseError> {
        self.base_url.join(name)
    }

    fn save(
        &self,
        name: &str,
        content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<(), BackendError>> {
        upload(self, name.to_owned(), content_type, raw).boxed()
    }
}

async fn upload(
    store: &S3Store,
    name: String,
    content_type: String,
    raw: Vec<u8>,
) -> Result<(), BackendError> {
    use std::convert::TryFrom;

    let len = i64::try_from(raw.len()).expect("raw data length must be within range of i64");

    let request = PutObjectRequest {
        acl: Some(store.acl.clone()),
        body: Some(StreamingBody::from(raw)),
        bucket: store.bucket.clone(),
        cache_control: Some(store.cache_control.clone()),
        content_length: Some(len),
        content_type: Some(content_type),
        key: name,
        ..Default::default()
    };

    let result = store.client.put_object(request).await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(BackendError::UploadFailed { source: e }),
    }
}

/// A store that keeps documents in memory, for tests and local use.
pub struct MemoryStore {
    map: RwLock<HashMap<String, (String, Vec<u8>)>>,
    base_url: Url,
    failing: bool,
}

impl MemoryStore {
    pub fn new(base_url: Url) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            base_url,
            failing: false,
        }
    }

    /// Creates a store whose every save fails, to exercise the
    /// document fallback path.
    pub fn failing(base_url: Url) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            base_url,
            failing: true,
        }
    }

    /// Whether a document was saved under the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.map.read().unwrap().contains_key(name)
    }
}

impl Store for MemoryStore {
    type Output = ();
    type Raw = Vec<u8>;

    fn get_url(&self, name: &str) -> Result<Url, ParseError> {
        self.base_url.join(name)
    }

    fn save(
        &self,
        name: &str,
        content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<(), BackendError>> {
        let name = name.to_owned();

        async move {
            if self.failing {
                return Err(BackendError::DocumentStoreFailed {
                    message: "memory store is configured to fail".to_owned(),
                });
            }

            self.map
                .write()
                .unwrap()
                .insert(name, (content_type, raw));

            Ok(())
        }
        .boxed()
    }
}
