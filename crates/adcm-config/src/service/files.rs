//! On-disk materialization of file and secretfile values
//!
//! Every file-kind leaf of a stored config is mirrored to a file under the
//! configured directory so that executors can reference it by path. Names
//! are keyed by owner, key and subkey; writes go through a temporary file
//! and a rename so a reader never sees a partial body.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use adcm_common::{AdcmError, AdcmResult, PRIVATE_KEY_FILE_KEY, SecretVault};
use adcm_persistence::ObjectRef;

use crate::model::{PrototypeSchema, value_at};

/// Namespace of materialized files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileScope {
    Object(ObjectRef),
    Group { group_id: i64, parent: ObjectRef },
}

impl FileScope {
    fn prefix(&self) -> String {
        match self {
            FileScope::Object(object) => format!("{}.{}", object.kind, object.id),
            FileScope::Group { group_id, parent } => {
                format!("group_{}.{}.{}", group_id, parent.kind, parent.id)
            }
        }
    }
}

/// Writer of materialized config files
#[derive(Debug, Clone)]
pub struct SecretFiles {
    dir: PathBuf,
}

impl SecretFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical path of the file backing `name`/`subname` in `scope`
    pub fn path_for(&self, scope: FileScope, name: &str, subname: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", scope.prefix(), name, subname))
    }

    /// Write every file-kind leaf of `config`; null or empty values remove
    /// the file. Secretfile bodies are decrypted before writing.
    pub async fn materialize(
        &self,
        scope: FileScope,
        schema: &PrototypeSchema,
        config: &Value,
        vault: &SecretVault,
    ) -> AdcmResult<()> {
        for field in schema.leaves().filter(|field| field.kind.is_file()) {
            let path = self.path_for(scope, &field.name, &field.subname);
            let body = match value_at(config, &field.name, &field.subname) {
                Some(Value::String(body)) if !body.is_empty() => body,
                _ => {
                    self.remove(&path).await?;
                    continue;
                }
            };

            let mut content = vault.decrypt_if_encrypted(body)?;
            if field.name == PRIVATE_KEY_FILE_KEY && content.ends_with('-') {
                content.push('\n');
            }
            self.write(&path, &content).await?;
        }
        Ok(())
    }

    /// Remove every file-kind leaf of `schema` in `scope`
    pub async fn remove_all(&self, scope: FileScope, schema: &PrototypeSchema) -> AdcmResult<()> {
        for field in schema.leaves().filter(|field| field.kind.is_file()) {
            self.remove(&self.path_for(scope, &field.name, &field.subname))
                .await?;
        }
        Ok(())
    }

    async fn write(&self, path: &Path, content: &str) -> AdcmResult<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| io_error(&self.dir, e))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let _ = fs::remove_file(&tmp).await;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp).await.map_err(|e| io_error(&tmp, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_error(&tmp, e))?;
        file.sync_all().await.map_err(|e| io_error(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, path).await.map_err(|e| io_error(path, e))?;
        debug!(path = %path.display(), "Config file written");
        Ok(())
    }

    async fn remove(&self, path: &Path) -> AdcmResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Config file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

fn io_error(path: &Path, err: std::io::Error) -> AdcmError {
    AdcmError::FileIoError(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adcm_persistence::{ObjectKind, PrototypeConfigRow};
    use serde_json::json;

    fn schema() -> PrototypeSchema {
        let rows: Vec<PrototypeConfigRow> = serde_json::from_value(json!([
            {"name": "cert", "type": "file"},
            {"name": "ansible_ssh_private_key_file", "type": "secretfile"},
            {"name": "host", "type": "string"},
        ]))
        .unwrap();
        PrototypeSchema::build(&rows).unwrap()
    }

    fn cluster() -> ObjectRef {
        ObjectRef::new(ObjectKind::Cluster, 7)
    }

    #[test]
    fn test_path_layout() {
        let files = SecretFiles::new("/srv/file");
        assert_eq!(
            files.path_for(FileScope::Object(cluster()), "cert", ""),
            PathBuf::from("/srv/file/cluster.7.cert.")
        );
        assert_eq!(
            files.path_for(
                FileScope::Group {
                    group_id: 3,
                    parent: cluster()
                },
                "tls",
                "key"
            ),
            PathBuf::from("/srv/file/group_3.cluster.7.tls.key")
        );
    }

    #[tokio::test]
    async fn test_materialize_writes_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let files = SecretFiles::new(dir.path());
        let vault = SecretVault::new(&SecretVault::generate_key());
        let scope = FileScope::Object(cluster());
        let schema = schema();

        let key = vault.encrypt("-----END KEY-----").unwrap();
        let config = json!({"cert": "PEM", "ansible_ssh_private_key_file": key, "host": "h"});
        files.materialize(scope, &schema, &config, &vault).await.unwrap();

        let cert_path = files.path_for(scope, "cert", "");
        let key_path = files.path_for(scope, "ansible_ssh_private_key_file", "");
        assert_eq!(std::fs::read_to_string(&cert_path).unwrap(), "PEM");
        assert_eq!(
            std::fs::read_to_string(&key_path).unwrap(),
            "-----END KEY-----\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let config = json!({"cert": null, "ansible_ssh_private_key_file": key, "host": "h"});
        files.materialize(scope, &schema, &config, &vault).await.unwrap();
        assert!(!cert_path.exists());
        assert!(key_path.exists());

        files.remove_all(scope, &schema).await.unwrap();
        assert!(!key_path.exists());
    }
}
