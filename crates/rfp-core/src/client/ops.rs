//! Metadata operations. Each one is a single task with no group requirement.

use std::future::Future;

use crate::connection::RemoteEntry;
use crate::error::Result;
use crate::group::Group;
use crate::pool::Worker;
use crate::scheduler::TaskHandle;

use super::Client;

impl Client {
    /// Schedules an arbitrary operation on the pool. `group = None` runs it on
    /// a non-transfer connection.
    pub fn schedule<T, F, Fut>(&self, group: Option<Group>, operation: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(Worker) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.ensure_connected()?;
        Ok(self.scheduler.schedule(operation, group, None))
    }

    pub async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = path.to_string();
        self.schedule(None, move |w| async move { w.connection().list(&path).await })?
            .await
    }

    /// Moves or renames `from` to `to`.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (from.to_string(), to.to_string());
        self.schedule(None, move |w| async move { w.connection().rename(&from, &to).await })?
            .await
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.schedule(None, move |w| async move { w.connection().remove(&path).await })?
            .await
    }

    pub async fn remove_dir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.schedule(None, move |w| async move { w.connection().remove_dir(&path).await })?
            .await
    }

    pub async fn create_folder(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.schedule(None, move |w| async move {
            w.connection().create_folder(&path).await
        })?
        .await
    }

    pub async fn create_empty_file(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.schedule(None, move |w| async move {
            w.connection().create_empty_file(&path).await
        })?
        .await
    }

    pub async fn pwd(&self) -> Result<String> {
        self.schedule(None, |w| async move { w.connection().pwd().await })?
            .await
    }

    /// Sends a raw protocol command; returns the reply text.
    pub async fn send(&self, command: &str) -> Result<String> {
        let command = command.to_string();
        self.schedule(None, move |w| async move { w.connection().send(&command).await })?
            .await
    }

    pub async fn size(&self, path: &str) -> Result<u64> {
        let path = path.to_string();
        self.schedule(None, move |w| async move { w.connection().size(&path).await })?
            .await
    }
}
