//! End-to-end builds through `BuildOrchestrator::process_build` with
//! synthetic skeletons in a directory-backed store.

mod common;

use tempfile::TempDir;
use webforge::rsrc::{ResourceEditor, RuntimeConfig};
use webforge::state_machine::Stage;
use webforge::{
    AppConfig, BuildOrchestrator, BuildStatus, ForgeConfig, LocalStorage, MemoryJobStore, Platform,
};

struct Harness {
    storage: TempDir,
    temp: TempDir,
    orchestrator: BuildOrchestrator<LocalStorage, MemoryJobStore>,
}

impl Harness {
    fn new() -> Self {
        let storage = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let config = ForgeConfig {
            temp_dir: Some(temp.path().to_path_buf()),
            ..ForgeConfig::default()
        };
        let orchestrator =
            BuildOrchestrator::new(LocalStorage::new(storage.path()), MemoryJobStore::new(), config);
        Self {
            storage,
            temp,
            orchestrator,
        }
    }

    fn put(&self, rel: &str, bytes: &[u8]) {
        let path = self.storage.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn put_skeleton(&self, platform: Platform) {
        self.put(
            &format!("skeletons/v1/{}", platform.skeleton_file_name()),
            &common::skeleton_archive(platform),
        );
    }

    fn output(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.storage.path().join(rel)).unwrap()
    }

    fn workspaces_left(&self) -> usize {
        std::fs::read_dir(self.temp.path()).unwrap().count()
    }
}

fn app_config() -> AppConfig {
    let mut config = AppConfig::new("https://forge.example.com/app", "Forge Demo");
    config.package_id = "com.example.forge".into();
    config.version_name = "2.3.4".into();
    config.version_code = "17".into();
    config.privacy_policy = Some("We keep nothing.".into());
    config.icon = Some("uploads/icon.png".into());
    config
}

#[tokio::test]
async fn every_platform_completes_with_monotonic_progress() {
    for platform in Platform::ALL {
        let harness = Harness::new();
        harness.put_skeleton(platform);
        harness.put("uploads/icon.png", &common::icon_png());

        let job_id = format!("job-{platform}");
        let job = harness
            .orchestrator
            .process_build(&job_id, platform, app_config())
            .await;

        assert_eq!(
            job.status,
            BuildStatus::Completed,
            "{platform}: {:?}",
            job.error_message
        );
        assert_eq!(job.progress, 100);
        assert!(job.error_message.is_none());
        let output = job.output_artifact_ref.as_deref().unwrap();
        assert!(output.starts_with(&format!("builds/{job_id}/forge-demo-")), "{output}");
        assert_eq!(job.file_size_bytes, Some(harness.output(output).len() as u64));
        assert!(job.download_url.is_some());

        let history = harness.orchestrator.jobs().history(&job_id);
        let progress: Vec<u8> = history.iter().map(|u| u.progress).collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{platform}: {progress:?}");
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(history.last().unwrap().status, BuildStatus::Completed);

        assert_eq!(harness.workspaces_left(), 0, "{platform} left its workspace behind");
    }
}

#[tokio::test]
async fn windows_executable_is_branded() {
    let harness = Harness::new();
    harness.put_skeleton(Platform::Windows);
    harness.put("uploads/icon.png", &common::icon_png());

    let job = harness
        .orchestrator
        .process_build("win-1", Platform::Windows, app_config())
        .await;
    assert_eq!(job.status, BuildStatus::Completed, "{:?}", job.error_message);

    let archive = harness.output(job.output_artifact_ref.as_deref().unwrap());
    let exe = common::zip_entry(&archive, "WebApp.exe").unwrap();
    let editor = ResourceEditor::from_bytes(exe).unwrap();
    assert_eq!(
        editor.runtime_config(),
        Some(RuntimeConfig {
            url: "https://forge.example.com/app".into(),
            title: "Forge Demo".into(),
        })
    );
    let info = editor.version_info().unwrap().unwrap();
    assert_eq!(info.string("ProductName").as_deref(), Some("Forge Demo"));
    assert_eq!(info.string("OriginalFilename").as_deref(), Some("WebApp.exe"));
    assert_eq!(info.version(), Some([2, 3, 4, 0]));

    let ico = common::zip_entry(&archive, "resources/app.ico").unwrap();
    assert_eq!(&ico[..4], &[0, 0, 1, 0]);
}

#[tokio::test]
async fn broken_executable_fails_the_build() {
    let harness = Harness::new();
    let files = common::skeleton_files(Platform::Windows)
        .into_iter()
        .map(|(path, body)| {
            if path.ends_with("WebApp.exe") {
                (path, b"MZ but nothing else".to_vec())
            } else {
                (path, body)
            }
        })
        .collect();
    harness.put("skeletons/v1/windows.zip", &common::zip(&files));

    let job = harness
        .orchestrator
        .process_build("win-2", Platform::Windows, AppConfig::new("https://a.example", "A"))
        .await;

    assert_eq!(job.status, BuildStatus::Failed);
    assert!(job.error_message.unwrap().starts_with("Resource edit failed"));
    assert_eq!(job.stage, Some(Stage::Icons));
    assert_eq!(harness.workspaces_left(), 0);
}

#[tokio::test]
async fn linux_archive_keeps_execute_bits() {
    let harness = Harness::new();
    harness.put_skeleton(Platform::Linux);

    let job = harness
        .orchestrator
        .process_build("linux-1", Platform::Linux, AppConfig::new("https://a.example", "A"))
        .await;
    assert_eq!(job.status, BuildStatus::Completed, "{:?}", job.error_message);

    let modes = common::tar_modes(&harness.output(job.output_artifact_ref.as_deref().unwrap()));
    let mode = |name: &str| {
        modes
            .iter()
            .find(|(path, _)| path == name)
            .map(|(_, mode)| *mode)
    };
    assert_eq!(mode("install.sh"), Some(0o755));
    assert_eq!(mode("webapp"), Some(0o755));
    assert_eq!(mode("config.json"), Some(0o644));
    assert_eq!(mode("webapp.desktop"), Some(0o644));
}

#[tokio::test]
async fn template_fetch_failure_leaves_nothing_behind() {
    let harness = Harness::new();

    let job = harness
        .orchestrator
        .process_build("missing", Platform::Macos, app_config())
        .await;

    assert_eq!(job.status, BuildStatus::Failed);
    assert!(!job.error_message.as_deref().unwrap_or_default().is_empty());
    assert!(job.download_url.is_none());
    assert_eq!(harness.workspaces_left(), 0);
    assert!(!harness.storage.path().join("builds").exists());
}

#[tokio::test]
async fn concurrent_builds_use_separate_workspaces() {
    let harness = Harness::new();
    harness.put_skeleton(Platform::ChromeExtension);

    let (a, b) = tokio::join!(
        harness
            .orchestrator
            .process_build("same", Platform::ChromeExtension, AppConfig::new("https://a.example", "A")),
        harness
            .orchestrator
            .process_build("same", Platform::ChromeExtension, AppConfig::new("https://b.example", "B")),
    );
    assert_eq!(a.status, BuildStatus::Completed, "{:?}", a.error_message);
    assert_eq!(b.status, BuildStatus::Completed, "{:?}", b.error_message);
    assert_ne!(a.output_artifact_ref, b.output_artifact_ref);
    assert_eq!(harness.workspaces_left(), 0);
}
