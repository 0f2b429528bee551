use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::client::ApiClient;
use crate::auth::{AuthBackend, Authenticator};
use crate::error::ApiError;
use crate::models::{Record, Syncable};

/// The server side of a syncable collection.
pub trait RemoteCollection<T: Syncable>: Send + Sync {
    /// Every record the server holds.
    fn list(&self) -> impl Future<Output = Result<Vec<Record<T>>, ApiError>> + Send;

    /// Creates a record; the server assigns the id.
    fn create(&self, fields: &T) -> impl Future<Output = Result<Record<T>, ApiError>> + Send;

    fn update(
        &self,
        id: i64,
        fields: &T,
    ) -> impl Future<Output = Result<Record<T>, ApiError>> + Send;

    fn delete(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<T: Syncable, R: RemoteCollection<T>> RemoteCollection<T> for Arc<R> {
    fn list(&self) -> impl Future<Output = Result<Vec<Record<T>>, ApiError>> + Send {
        (**self).list()
    }

    fn create(&self, fields: &T) -> impl Future<Output = Result<Record<T>, ApiError>> + Send {
        (**self).create(fields)
    }

    fn update(
        &self,
        id: i64,
        fields: &T,
    ) -> impl Future<Output = Result<Record<T>, ApiError>> + Send {
        (**self).update(id, fields)
    }

    fn delete(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).delete(id)
    }
}

/// REST collection at `{base}/{collection}/`, every call behind the
/// auth-retry wrapper.
pub struct HttpCollection<T, B> {
    client: ApiClient,
    auth: Arc<Authenticator<B>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Syncable, B: AuthBackend> HttpCollection<T, B> {
    pub fn new(client: ApiClient, auth: Arc<Authenticator<B>>) -> Self {
        Self {
            client,
            auth,
            _marker: PhantomData,
        }
    }

    fn list_path() -> String {
        format!("{}/", T::COLLECTION)
    }

    fn item_path(id: i64) -> String {
        format!("{}/{}/", T::COLLECTION, id)
    }
}

impl<T: Syncable, B: AuthBackend> RemoteCollection<T> for HttpCollection<T, B> {
    async fn list(&self) -> Result<Vec<Record<T>>, ApiError> {
        let path = Self::list_path();
        self.auth
            .call_with_auth_retry(|| {
                let token = self.auth.credentials().token();
                let (client, path) = (&self.client, path.as_str());
                async move { client.get_json::<Vec<Record<T>>>(path, token.as_deref()).await }
            })
            .await
    }

    async fn create(&self, fields: &T) -> Result<Record<T>, ApiError> {
        let path = Self::list_path();
        self.auth
            .call_with_auth_retry(|| {
                let token = self.auth.credentials().token();
                let (client, path) = (&self.client, path.as_str());
                async move { client.post_json::<T, Record<T>>(path, token.as_deref(), fields).await }
            })
            .await
    }

    async fn update(&self, id: i64, fields: &T) -> Result<Record<T>, ApiError> {
        let path = Self::item_path(id);
        self.auth
            .call_with_auth_retry(|| {
                let token = self.auth.credentials().token();
                let (client, path) = (&self.client, path.as_str());
                async move { client.put_json::<T, Record<T>>(path, token.as_deref(), fields).await }
            })
            .await
    }

    async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let path = Self::item_path(id);
        self.auth
            .call_with_auth_retry(|| {
                let token = self.auth.credentials().token();
                let (client, path) = (&self.client, path.as_str());
                async move { client.delete(path, token.as_deref()).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryCollection;
    use crate::models::Patient;
    use chrono::NaiveDate;

    #[test]
    fn test_paths() {
        assert_eq!(
            HttpCollection::<Patient, crate::api::HttpAuthBackend>::list_path(),
            "patients/"
        );
        assert_eq!(
            HttpCollection::<Patient, crate::api::HttpAuthBackend>::item_path(501),
            "patients/501/"
        );
    }

    #[tokio::test]
    async fn test_arc_delegates() {
        let remote = Arc::new(InMemoryCollection::<Patient>::new());
        let fields = Patient::new(
            "STU1001",
            "Alice",
            "Johnson",
            NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
            "Female",
        );

        let created = RemoteCollection::create(&remote, &fields).await.unwrap();
        let listed = RemoteCollection::list(&remote).await.unwrap();

        assert_eq!(listed, vec![created]);
    }
}
