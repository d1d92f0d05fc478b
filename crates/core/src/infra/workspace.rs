use std::io;
use std::path::{Path, PathBuf};

use crate::domain::job::UploadedAudio;

/// ジョブ用一時ディレクトリのルート。`<root>/<job_id>/` をジョブごとに割り当てる。
#[derive(Debug, Clone)]
pub struct WorkRoot {
    root: PathBuf,
}

impl WorkRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    pub async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// 前回プロセスの残骸 (終了しなかったジョブのディレクトリ) を削除する。
    /// 名前がジョブ ID (UUID) のディレクトリだけが対象で、それ以外には触れない。
    pub async fn sweep_stale(&self) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let is_job_dir = name
                .to_str()
                .is_some_and(|name| uuid::Uuid::parse_str(name).is_ok());
            if !is_job_dir {
                log::debug!("Leaving non-job entry {name:?} under {:?}", self.root);
                continue;
            }
            tokio::fs::remove_dir_all(entry.path()).await?;
            removed += 1;
        }
        if removed > 0 {
            log::info!("Removed {removed} stale job directories under {:?}", self.root);
        }
        Ok(removed)
    }

    /// ジョブディレクトリを作り、アップロードを書き込む。
    pub async fn create_job(&self, job_id: &str, upload: &UploadedAudio) -> io::Result<JobWorkspace> {
        self.prepare().await?;
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir(&dir).await?;

        let input = match upload.extension() {
            Some(ext) => dir.join(format!("input.{ext}")),
            None => dir.join("input"),
        };
        // 以降の失敗は Drop で片付く
        let workspace = JobWorkspace {
            job_id: job_id.to_string(),
            dir,
            input,
            released: false,
        };
        tokio::fs::write(&workspace.input, &upload.bytes).await?;
        Ok(workspace)
    }
}

/// 1ジョブ分の入力・正規化済み音声・セグメントを保持するスコープ。
///
/// `release` で明示的に削除する。途中の `?` やパニックで抜けた場合は Drop が削除する。
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: String,
    dir: PathBuf,
    input: PathBuf,
    released: bool,
}

impl JobWorkspace {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn normalized_path(&self) -> PathBuf {
        self.dir.join("normalized.wav")
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.dir.join("segments")
    }

    pub async fn release(mut self) -> io::Result<()> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("job {}: workspace removed on drop", self.job_id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "job {}: failed to remove workspace {:?}: {e}",
                self.job_id,
                self.dir
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_job_writes_input_with_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkRoot::new(tmp.path().join("jobs"));
        let upload = UploadedAudio::new(b"RIFF".to_vec()).with_file_name("clip.wav");

        let ws = root.create_job("job-a", &upload).await.unwrap();
        assert_eq!(ws.input_path(), root.job_dir("job-a").join("input.wav"));
        assert_eq!(std::fs::read(ws.input_path()).unwrap(), b"RIFF");
        assert!(ws.segments_dir().starts_with(ws.dir()));
        assert!(ws.normalized_path().starts_with(ws.dir()));

        ws.release().await.unwrap();
        assert!(!root.job_dir("job-a").exists());
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkRoot::new(tmp.path());
        {
            let ws = root
                .create_job("job-b", &UploadedAudio::new(vec![0; 8]))
                .await
                .unwrap();
            std::fs::create_dir_all(ws.segments_dir()).unwrap();
            std::fs::write(ws.segments_dir().join("segment_00000.wav"), b"x").unwrap();
        }
        assert!(!root.job_dir("job-b").exists());
    }

    #[tokio::test]
    async fn jobs_get_separate_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkRoot::new(tmp.path());
        let a = root.create_job("a", &UploadedAudio::new(vec![1])).await.unwrap();
        let b = root.create_job("b", &UploadedAudio::new(vec![2])).await.unwrap();
        assert_ne!(a.segments_dir(), b.segments_dir());
        assert_eq!(std::fs::read(a.input_path()).unwrap(), vec![1]);
        assert_eq!(std::fs::read(b.input_path()).unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn duplicate_job_id_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkRoot::new(tmp.path());
        let _first = root.create_job("same", &UploadedAudio::new(vec![1])).await.unwrap();
        assert!(root.create_job("same", &UploadedAudio::new(vec![1])).await.is_err());
    }

    #[tokio::test]
    async fn sweep_stale_removes_leftovers() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkRoot::new(tmp.path());
        let old_1 = uuid::Uuid::new_v4().to_string();
        let old_2 = uuid::Uuid::new_v4().to_string();
        std::fs::create_dir_all(root.job_dir(&old_1).join("segments")).unwrap();
        std::fs::create_dir_all(root.job_dir(&old_2)).unwrap();

        assert_eq!(root.sweep_stale().await.unwrap(), 2);
        assert!(!root.job_dir(&old_1).exists());
        assert!(!root.job_dir(&old_2).exists());
    }

    #[tokio::test]
    async fn sweep_keeps_directories_that_are_not_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkRoot::new(tmp.path());
        let photos = tmp.path().join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        std::fs::write(photos.join("cat.jpg"), b"jpeg").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"keep").unwrap();
        let stale = uuid::Uuid::new_v4().to_string();
        std::fs::create_dir_all(root.job_dir(&stale)).unwrap();

        assert_eq!(root.sweep_stale().await.unwrap(), 1);
        assert!(!root.job_dir(&stale).exists());
        assert_eq!(std::fs::read(photos.join("cat.jpg")).unwrap(), b"jpeg");
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn sweep_missing_root_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let root = WorkRoot::new(tmp.path().join("absent"));
        assert_eq!(root.sweep_stale().await.unwrap(), 0);
    }
}
