//! 一次性环境生命周期测试：假平台 + 假通道，验证每次 execute 恰好销毁一次

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sortie::sandbox::{
    ChannelConnector, ChannelEndpoint, CommandExecutor, EphemeralEnvironmentManager, RetryPolicy,
    SandboxChannel, SandboxError, SandboxPlatform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailAt {
    Provision,
    EnsureRunning,
    ControlEndpoint,
    FetchArchive,
    Destroy,
}

#[derive(Default)]
struct Counters {
    provisioned: AtomicUsize,
    destroyed: AtomicUsize,
    connects: AtomicUsize,
    closed: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

enum Archive {
    Missing,
    Bytes(Vec<u8>),
}

struct FakePlatform {
    counters: Arc<Counters>,
    fail_at: Option<FailAt>,
    archive: Archive,
}

impl FakePlatform {
    fn fail(&self, step: FailAt) -> Result<(), SandboxError> {
        if self.fail_at == Some(step) {
            Err(SandboxError::Platform {
                operation: "fake",
                target: format!("{step:?}"),
                message: "injected failure".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SandboxPlatform for FakePlatform {
    async fn provision(&self) -> Result<String, SandboxError> {
        self.fail(FailAt::Provision)?;
        let n = self.counters.provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(format!("container-{n:012}"))
    }

    async fn ensure_running(&self, _id: &str) -> Result<(), SandboxError> {
        self.fail(FailAt::EnsureRunning)
    }

    async fn control_endpoint(&self, _id: &str) -> Result<ChannelEndpoint, SandboxError> {
        self.fail(FailAt::ControlEndpoint)?;
        Ok(ChannelEndpoint {
            host: "127.0.0.1".into(),
            port: 49153,
        })
    }

    async fn fetch_archive(&self, _id: &str, _path: &str) -> Result<Option<Vec<u8>>, SandboxError> {
        self.fail(FailAt::FetchArchive)?;
        match &self.archive {
            Archive::Missing => Ok(None),
            Archive::Bytes(bytes) => Ok(Some(bytes.clone())),
        }
    }

    async fn destroy(&self, _id: &str) -> Result<(), SandboxError> {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        self.fail(FailAt::Destroy)
    }
}

#[derive(Clone, Copy)]
enum RunBehavior {
    Exit(i32),
    Fail,
    Hang,
}

struct FakeConnector {
    counters: Arc<Counters>,
    /// 前 n 次连接失败
    failures_before_success: usize,
    credential_present: bool,
    run: RunBehavior,
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    fn locate_credential(&self) -> Result<(), SandboxError> {
        if self.credential_present {
            Ok(())
        } else {
            Err(SandboxError::CredentialMissing("/root/.ssh/id_ecdsa".into()))
        }
    }

    async fn connect(
        &self,
        _endpoint: &ChannelEndpoint,
    ) -> Result<Box<dyn SandboxChannel>, SandboxError> {
        let attempt = self.counters.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures_before_success {
            return Err(SandboxError::Connection(format!("refused (attempt {attempt})")));
        }
        Ok(Box::new(FakeChannel {
            counters: self.counters.clone(),
            run: self.run,
            open: true,
        }))
    }
}

struct FakeChannel {
    counters: Arc<Counters>,
    run: RunBehavior,
    open: bool,
}

#[async_trait]
impl SandboxChannel for FakeChannel {
    async fn is_alive(&self) -> bool {
        self.open
    }

    async fn run(&self, command: &str) -> Result<Option<i32>, SandboxError> {
        self.counters.commands.lock().unwrap().push(command.to_string());
        match self.run {
            RunBehavior::Exit(code) => Ok(Some(code)),
            RunBehavior::Fail => Err(SandboxError::Command("session lost".into())),
            RunBehavior::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SandboxError> {
        if self.open {
            self.open = false;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn tar_with(name: &str, body: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, body).unwrap();
    builder.into_inner().unwrap()
}

struct Harness {
    counters: Arc<Counters>,
    fail_at: Option<FailAt>,
    archive: Archive,
    failures_before_success: usize,
    credential_present: bool,
    run: RunBehavior,
}

impl Harness {
    fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            fail_at: None,
            archive: Archive::Bytes(tar_with("out.txt", b"80/tcp open http\n")),
            failures_before_success: 0,
            credential_present: true,
            run: RunBehavior::Exit(0),
        }
    }

    fn manager(self) -> (Arc<Counters>, EphemeralEnvironmentManager) {
        let platform = FakePlatform {
            counters: self.counters.clone(),
            fail_at: self.fail_at,
            archive: self.archive,
        };
        let connector = FakeConnector {
            counters: self.counters.clone(),
            failures_before_success: self.failures_before_success,
            credential_present: self.credential_present,
            run: self.run,
        };
        let manager = EphemeralEnvironmentManager::new(Arc::new(platform), Arc::new(connector))
            .with_retry(RetryPolicy::new(5, Duration::from_secs(2)));
        (self.counters, manager)
    }
}

fn destroyed(counters: &Counters) -> usize {
    counters.destroyed.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_successful_execution_tears_down_once() {
    let (counters, eem) = Harness::new().manager();

    let out = eem
        .execute("nmap -sV target.com", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(out.file_content, "80/tcp open http\n");
    assert!(out.filename.starts_with("nmap_-sV_targetcom_"));
    assert_eq!(
        counters.commands.lock().unwrap().clone(),
        vec![format!("nmap -sV target.com > /tmp/{} 2>&1", out.filename)]
    );
    assert_eq!(counters.provisioned.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test]
async fn test_nonzero_exit_still_reads_output() {
    let mut h = Harness::new();
    h.run = RunBehavior::Exit(1);
    let (counters, eem) = h.manager();

    let out = eem.execute("curl -sSL 'x'", &CancellationToken::new()).await.unwrap();
    assert_eq!(out.file_content, "80/tcp open http\n");
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test]
async fn test_each_execution_gets_its_own_instance() {
    let (counters, eem) = Harness::new().manager();
    let token = CancellationToken::new();
    eem.execute("dig +short a.com", &token).await.unwrap();
    eem.execute("dig +short b.com", &token).await.unwrap();
    assert_eq!(counters.provisioned.load(Ordering::SeqCst), 2);
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
    assert_eq!(destroyed(&counters), 2);
}

#[tokio::test]
async fn test_provision_failure_has_nothing_to_tear_down() {
    let mut h = Harness::new();
    h.fail_at = Some(FailAt::Provision);
    let (counters, eem) = h.manager();

    assert!(eem.execute("ping -c 4 a", &CancellationToken::new()).await.is_err());
    assert_eq!(destroyed(&counters), 0);
}

#[tokio::test]
async fn test_failure_at_any_step_tears_down_exactly_once() {
    for step in [FailAt::EnsureRunning, FailAt::ControlEndpoint, FailAt::FetchArchive] {
        let mut h = Harness::new();
        h.fail_at = Some(step);
        let (counters, eem) = h.manager();

        let err = eem
            .execute("whois a.com", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Platform { .. }), "{step:?}: {err}");
        assert_eq!(destroyed(&counters), 1, "{step:?}");
    }
}

#[tokio::test]
async fn test_remote_command_failure_tears_down() {
    let mut h = Harness::new();
    h.run = RunBehavior::Fail;
    let (counters, eem) = h.manager();

    let err = eem.execute("whatweb 'x'", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SandboxError::Command(_)));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test]
async fn test_missing_credential_fails_before_connecting() {
    let mut h = Harness::new();
    h.credential_present = false;
    let (counters, eem) = h.manager();

    let err = eem.execute("ping -c 4 a", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SandboxError::CredentialMissing(_)));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_retries_exhausted() {
    let mut h = Harness::new();
    h.failures_before_success = usize::MAX;
    let (counters, eem) = h.manager();

    let start = tokio::time::Instant::now();
    let err = eem.execute("ping -c 4 a", &CancellationToken::new()).await.unwrap_err();

    assert!(err.is_connection_failure());
    assert_eq!(err.to_string(), "Connection failed: refused (attempt 5)");
    assert_eq!(counters.connects.load(Ordering::SeqCst), 5);
    assert_eq!(start.elapsed(), Duration::from_secs(8));
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_succeeds_after_retries() {
    let mut h = Harness::new();
    h.failures_before_success = 2;
    let (counters, eem) = h.manager();

    let out = eem.execute("ping -c 4 a", &CancellationToken::new()).await.unwrap();
    assert_eq!(out.file_content, "80/tcp open http\n");
    assert_eq!(counters.connects.load(Ordering::SeqCst), 3);
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test]
async fn test_missing_output_path_is_not_an_error() {
    let mut h = Harness::new();
    h.archive = Archive::Missing;
    let (_, eem) = h.manager();

    let out = eem.execute("true", &CancellationToken::new()).await.unwrap();
    assert_eq!(
        out.file_content,
        format!("Command produced no output file at '/tmp/{}'.", out.filename)
    );
}

#[tokio::test]
async fn test_empty_archive_is_not_an_error() {
    let mut h = Harness::new();
    h.archive = Archive::Bytes(tar::Builder::new(Vec::new()).into_inner().unwrap());
    let (counters, eem) = h.manager();

    let out = eem.execute("true", &CancellationToken::new()).await.unwrap();
    assert_eq!(
        out.file_content,
        format!(
            "Command produced no output file at '/tmp/{}' (empty archive).",
            out.filename
        )
    );
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test]
async fn test_destroy_failure_does_not_mask_result() {
    let mut h = Harness::new();
    h.fail_at = Some(FailAt::Destroy);
    let (counters, eem) = h.manager();

    let out = eem.execute("dig +short a.com", &CancellationToken::new()).await.unwrap();
    assert_eq!(out.file_content, "80/tcp open http\n");
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_tears_down_before_returning() {
    let mut h = Harness::new();
    h.run = RunBehavior::Hang;
    let (counters, eem) = h.manager();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let err = eem.execute("sqlmap -u 'x' --batch", &token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_exec_timeout() {
    let mut h = Harness::new();
    h.run = RunBehavior::Hang;
    let (counters, eem) = h.manager();
    let eem = eem.with_exec_timeout(Duration::from_secs(30));

    let err = eem.execute("nikto -host 'x'", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SandboxError::CommandTimeout(30)));
    assert_eq!(destroyed(&counters), 1);
}

#[tokio::test]
async fn test_already_cancelled_token_skips_provisioning() {
    let (counters, eem) = Harness::new().manager();
    let token = CancellationToken::new();
    token.cancel();

    let err = eem.execute("ping -c 4 a", &token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(counters.provisioned.load(Ordering::SeqCst), 0);
}
