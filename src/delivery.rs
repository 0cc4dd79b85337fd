//! Delivery of a rendered report over a secure file channel.
//!
//! The transport handshake itself is out of scope; a session capability is
//! injected through [`SecureChannelFactory`]. The deliverer stages the
//! payload in a temporary file, uploads it under the account's fixed remote
//! name, verifies the remote file exists, and records the outcome in the
//! submission ledger whatever happens.

use crate::config::ChannelCredentials;
use crate::formatter::ReportKind;
use crate::ledger::{SubmissionEntry, SubmissionLedger};
use crate::{Result, SoundscanError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An open session on the secure file-transfer channel.
#[async_trait]
pub trait SecureFileChannel: Send {
    /// Returns false on bad credentials; transport failures are errors.
    async fn authenticate(&mut self, login: &str, password: &str) -> Result<bool>;
    async fn put(&mut self, remote: &str, local: &Path) -> Result<()>;
    async fn exists(&mut self, remote: &str) -> Result<bool>;
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions to a remote host.
#[async_trait]
pub trait SecureChannelFactory: Send + Sync {
    async fn connect(&self, host: &str) -> Result<Box<dyn SecureFileChannel>>;
}

/// Uploads a rendered report and confirms receipt.
///
/// One call is at most one delivery attempt; avoiding a second attempt in
/// the same period is the scheduler's job, via the ledger.
pub struct Deliverer {
    factory: Arc<dyn SecureChannelFactory>,
    ledger: Arc<dyn SubmissionLedger>,
}

impl Deliverer {
    pub fn new(factory: Arc<dyn SecureChannelFactory>, ledger: Arc<dyn SubmissionLedger>) -> Self {
        Self { factory, ledger }
    }

    /// Deliver `submission` for `kind` using `credentials`, recording the
    /// outcome under `submitted_at`. Every failure path still closes the
    /// channel, drops the staging file, and appends an outcome entry to
    /// the ledger.
    pub async fn upload(
        &self,
        kind: ReportKind,
        credentials: &ChannelCredentials,
        submission: &str,
        submitted_at: DateTime<Utc>,
    ) -> bool {
        info!(kind = %kind, host = %credentials.host, "starting report upload");

        let success = match self.try_upload(credentials, submission).await {
            Ok(()) => {
                info!(kind = %kind, "successfully uploaded new report");
                true
            }
            Err(err) => {
                error!(kind = %kind, "error in report upload: {err:#}");
                false
            }
        };

        let entry = SubmissionEntry {
            submitted_at,
            kind,
            success,
        };
        if let Err(err) = self.ledger.append(entry).await {
            error!(kind = %kind, "failed to record delivery outcome: {err:#}");
        }

        success
    }

    async fn try_upload(&self, credentials: &ChannelCredentials, submission: &str) -> Result<()> {
        if !credentials.is_complete() {
            return Err(
                SoundscanError::MissingConfiguration("file transfer credentials").into(),
            );
        }

        let mut channel = self.factory.connect(&credentials.host).await?;
        let outcome = self.transfer(channel.as_mut(), credentials, submission).await;

        if let Err(err) = channel.close().await {
            warn!("error closing file channel: {err:#}");
        }

        outcome
    }

    async fn transfer(
        &self,
        channel: &mut dyn SecureFileChannel,
        credentials: &ChannelCredentials,
        submission: &str,
    ) -> Result<()> {
        if !channel
            .authenticate(&credentials.login, &credentials.password)
            .await?
        {
            return Err(SoundscanError::AuthenticationFailed {
                host: credentials.host.clone(),
            }
            .into());
        }

        debug!("writing report to temporary file");
        let mut staging = tempfile::Builder::new()
            .prefix("soundscan-courier")
            .suffix(".txt")
            .tempfile()?;
        staging.write_all(submission.as_bytes())?;
        staging.flush()?;

        let remote = credentials.remote_file_name();
        channel.put(&remote, staging.path()).await?;

        // The put call reporting success is not proof of receipt.
        debug!("checking report exists on remote server");
        if !channel.exists(&remote).await? {
            return Err(SoundscanError::RemoteFileMissing(remote).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{FileSubmissionLedger, SubmissionLedger};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct ChannelState {
        calls: Vec<String>,
        uploaded: Option<(String, String)>,
    }

    struct FakeChannel {
        state: Arc<Mutex<ChannelState>>,
        accept_auth: bool,
        remote_appears: bool,
    }

    #[async_trait]
    impl SecureFileChannel for FakeChannel {
        async fn authenticate(&mut self, login: &str, _password: &str) -> Result<bool> {
            self.state.lock().unwrap().calls.push(format!("auth:{login}"));
            Ok(self.accept_auth)
        }

        async fn put(&mut self, remote: &str, local: &Path) -> Result<()> {
            let payload = std::fs::read_to_string(local)?;
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("put:{remote}"));
            state.uploaded = Some((remote.to_string(), payload));
            Ok(())
        }

        async fn exists(&mut self, remote: &str) -> Result<bool> {
            self.state.lock().unwrap().calls.push(format!("exists:{remote}"));
            Ok(self.remote_appears)
        }

        async fn close(&mut self) -> Result<()> {
            self.state.lock().unwrap().calls.push("close".to_string());
            Ok(())
        }
    }

    struct FakeFactory {
        state: Arc<Mutex<ChannelState>>,
        accept_auth: bool,
        remote_appears: bool,
    }

    #[async_trait]
    impl SecureChannelFactory for FakeFactory {
        async fn connect(&self, host: &str) -> Result<Box<dyn SecureFileChannel>> {
            self.state.lock().unwrap().calls.push(format!("connect:{host}"));
            Ok(Box::new(FakeChannel {
                state: self.state.clone(),
                accept_auth: self.accept_auth,
                remote_appears: self.remote_appears,
            }))
        }
    }

    fn credentials() -> ChannelCredentials {
        ChannelCredentials {
            host: "transfer.example.com".to_string(),
            login: "digi".to_string(),
            password: "secret".to_string(),
        }
    }

    fn harness(
        dir: &tempfile::TempDir,
        accept_auth: bool,
        remote_appears: bool,
    ) -> (Deliverer, Arc<Mutex<ChannelState>>, Arc<FileSubmissionLedger>) {
        let state = Arc::new(Mutex::new(ChannelState::default()));
        let ledger = Arc::new(
            FileSubmissionLedger::new(dir.path().join("submissions.jsonl")).unwrap(),
        );
        let factory = Arc::new(FakeFactory {
            state: state.clone(),
            accept_auth,
            remote_appears,
        });
        (
            Deliverer::new(factory, ledger.clone()),
            state,
            ledger,
        )
    }

    #[tokio::test]
    async fn successful_upload_writes_payload_and_records_success() {
        let dir = tempdir().unwrap();
        let (deliverer, state, ledger) = harness(&dir, true, true);

        let ok = deliverer
            .upload(ReportKind::Digital, &credentials(), "92|x\nD3|y\n94|1|1", Utc::now())
            .await;
        assert!(ok);

        let state = state.lock().unwrap();
        assert_eq!(
            state.uploaded,
            Some(("digi.txt".to_string(), "92|x\nD3|y\n94|1|1".to_string()))
        );
        assert!(state.calls.contains(&"close".to_string()));
        drop(state);

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);
        assert_eq!(entries[0].kind, ReportKind::Digital);
    }

    #[tokio::test]
    async fn auth_failure_skips_transfer_and_records_failure() {
        let dir = tempdir().unwrap();
        let (deliverer, state, ledger) = harness(&dir, false, true);

        let ok = deliverer
            .upload(ReportKind::Physical, &credentials(), "payload", Utc::now())
            .await;
        assert!(!ok);

        let state = state.lock().unwrap();
        assert!(state.uploaded.is_none());
        // The channel is still closed even though nothing was transferred.
        assert!(state.calls.contains(&"close".to_string()));
        drop(state);

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn missing_remote_file_after_put_is_a_failure() {
        let dir = tempdir().unwrap();
        let (deliverer, state, ledger) = harness(&dir, true, false);

        let ok = deliverer
            .upload(ReportKind::Digital, &credentials(), "payload", Utc::now())
            .await;
        assert!(!ok);

        // put happened, but verification did not find the file
        let state = state.lock().unwrap();
        assert!(state.calls.contains(&"put:digi.txt".to_string()));
        drop(state);

        assert!(!ledger.entries().await.unwrap()[0].success);
    }

    #[tokio::test]
    async fn incomplete_credentials_never_open_a_channel() {
        let dir = tempdir().unwrap();
        let (deliverer, state, ledger) = harness(&dir, true, true);

        let mut creds = credentials();
        creds.password.clear();
        let ok = deliverer.upload(ReportKind::Digital, &creds, "payload", Utc::now()).await;
        assert!(!ok);

        assert!(state.lock().unwrap().calls.is_empty());
        assert_eq!(ledger.entries().await.unwrap().len(), 1);
    }
}
