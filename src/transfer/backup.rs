//! Backup helpers (§4.3): `backup_remote` renames `path` to
//! `pathStem.bak.pathExt`; `restore_remote` renames it back. Both are
//! no-ops if the target is absent.

use super::RemoteClient;

fn backup_path(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.bak.{ext}"),
        _ => format!("{path}.bak"),
    }
}

pub async fn backup_remote(client: &dyn RemoteClient, path: &str) -> anyhow::Result<()> {
    if !client.exists(path).await? {
        return Ok(());
    }
    client.rename(path, &backup_path(path)).await
}

pub async fn restore_remote(client: &dyn RemoteClient, path: &str) -> anyhow::Result<()> {
    let backup = backup_path(path);
    if !client.exists(&backup).await? {
        return Ok(());
    }
    client.rename(&backup, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::MockClient;

    #[tokio::test]
    async fn backup_then_restore_round_trips() {
        let client = MockClient::new();
        client.seed_file("/v/movie.mkv", b"source bytes").await;

        backup_remote(&client, "/v/movie.mkv").await.unwrap();
        assert!(!client.exists("/v/movie.mkv").await.unwrap());
        assert!(client.exists("/v/movie.bak.mkv").await.unwrap());

        restore_remote(&client, "/v/movie.mkv").await.unwrap();
        assert!(client.exists("/v/movie.mkv").await.unwrap());
        assert!(!client.exists("/v/movie.bak.mkv").await.unwrap());
    }

    #[tokio::test]
    async fn backup_of_missing_path_is_a_no_op() {
        let client = MockClient::new();
        backup_remote(&client, "/v/missing.mkv").await.unwrap();
        assert!(!client.exists("/v/missing.bak.mkv").await.unwrap());
    }

    #[tokio::test]
    async fn restore_of_missing_backup_is_a_no_op() {
        let client = MockClient::new();
        client.seed_file("/v/movie.mkv", b"source bytes").await;
        restore_remote(&client, "/v/movie.mkv").await.unwrap();
        assert!(client.exists("/v/movie.mkv").await.unwrap());
    }
}
