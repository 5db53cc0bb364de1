//! OCI image layout writer: `oci-layout`, `index.json`, and
//! `blobs/sha256/<hash>` for every referenced blob.

use crate::error::{Error, Result};
use crate::tarball::ImageTarball;
use serde::Serialize;
use std::path::Path;

const LAYOUT_VERSION: &str = "1.0.0";

#[derive(Serialize)]
struct OciLayoutFile {
    #[serde(rename = "imageLayoutVersion")]
    image_layout_version: String,
}

#[derive(Serialize)]
struct IndexDescriptor {
    #[serde(rename = "mediaType")]
    media_type: String,
    size: i64,
    digest: String,
}

#[derive(Serialize)]
struct Index {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    manifests: Vec<IndexDescriptor>,
}

/// Write `tarball` as an OCI image layout rooted at `dir`.
pub async fn write(tarball: &ImageTarball, dir: &Path) -> Result<()> {
    let blobs_dir = dir.join("blobs").join("sha256");
    tokio::fs::create_dir_all(&blobs_dir)
        .await
        .map_err(|e| Error::io(blobs_dir.display().to_string(), "create_dir_all", e))?;

    write_file(
        &dir.join("oci-layout"),
        &serde_json::to_vec(&OciLayoutFile {
            image_layout_version: LAYOUT_VERSION.to_string(),
        })
        .map_err(|e| Error::json("oci-layout", e))?,
    )
    .await?;

    write_blob(&blobs_dir, &tarball.manifest_digest.hex(), &tarball.manifest_bytes).await?;
    write_blob(&blobs_dir, &tarball.config_digest.hex(), &tarball.config_bytes).await?;
    for layer in &tarball.layers {
        write_blob(&blobs_dir, &layer.compressed_digest.hex(), &layer.compressed_bytes).await?;
    }

    let index = Index {
        schema_version: 2,
        manifests: vec![IndexDescriptor {
            media_type: tarball.manifest_media_type.clone(),
            size: tarball.manifest_bytes.len() as i64,
            digest: tarball.manifest_digest.canonical().to_string(),
        }],
    };
    write_file(
        &dir.join("index.json"),
        &serde_json::to_vec(&index).map_err(|e| Error::json("index.json", e))?,
    )
    .await?;

    Ok(())
}

async fn write_blob(blobs_dir: &Path, hex_digest: &str, bytes: &[u8]) -> Result<()> {
    write_file(&blobs_dir.join(hex_digest), bytes).await
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| Error::io(path.display().to_string(), "write", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarball::LayerBlob;
    use ocibuild_digest::Digest;

    #[tokio::test]
    async fn writes_layout_index_and_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = ImageTarball {
            manifest_media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            manifest_bytes: b"{}".to_vec(),
            manifest_digest: Digest::of_bytes(b"{}"),
            config_bytes: b"{\"x\":1}".to_vec(),
            config_digest: Digest::of_bytes(b"{\"x\":1}"),
            layers: vec![LayerBlob {
                diff_id: Digest::of_bytes(b"diff"),
                compressed_digest: Digest::of_bytes(b"compressed"),
                compressed_bytes: b"gz".to_vec(),
                uncompressed_tar: b"tar".to_vec(),
            }],
            repo_tags: vec![],
        };

        write(&tarball, dir.path()).await.unwrap();

        assert!(dir.path().join("oci-layout").exists());
        assert!(dir.path().join("index.json").exists());
        assert!(dir
            .path()
            .join("blobs/sha256")
            .join(tarball.manifest_digest.hex())
            .exists());
        assert!(dir
            .path()
            .join("blobs/sha256")
            .join(tarball.layers[0].compressed_digest.hex())
            .exists());
    }
}
