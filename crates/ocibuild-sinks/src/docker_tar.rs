//! Docker-tar image archive writer.
//!
//! Layout: `<configDigest>.json`, one `<diffId>/layer.tar` per layer, and a
//! top-level `manifest.json` describing the image.

use crate::error::{Error, Result};
use crate::tarball::ImageTarball;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct DockerManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags")]
    repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// Write `tarball` as a Docker-tar image archive to `writer`.
pub fn write<W: Write>(tarball: &ImageTarball, writer: W) -> Result<()> {
    let mut builder = tar::Builder::new(writer);
    builder.mode(tar::HeaderMode::Deterministic);

    let config_name = format!("{}.json", tarball.config_digest.hex());
    append_bytes(&mut builder, &config_name, &tarball.config_bytes)?;

    let mut layer_paths = Vec::with_capacity(tarball.layers.len());
    for layer in &tarball.layers {
        let path = format!("{}/layer.tar", layer.diff_id.hex());
        append_bytes(&mut builder, &path, &layer.uncompressed_tar)?;
        layer_paths.push(path);
    }

    let manifest = vec![DockerManifestEntry {
        config: config_name,
        repo_tags: tarball.repo_tags.clone(),
        layers: layer_paths,
    }];
    let manifest_json =
        serde_json::to_vec(&manifest).map_err(|e| Error::json("docker manifest.json", e))?;
    append_bytes(&mut builder, "manifest.json", &manifest_json)?;

    builder
        .into_inner()
        .map_err(|e| Error::io("<archive>", "finish tar stream", e))?;
    Ok(())
}

fn append_bytes<W: Write>(builder: &mut tar::Builder<W>, path: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_ustar();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(1);
    header.set_cksum();
    builder
        .append_data(&mut header, path, bytes)
        .map_err(|e| Error::io(path, "append tar entry", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarball::LayerBlob;
    use ocibuild_digest::Digest;

    fn sample_tarball() -> ImageTarball {
        ImageTarball {
            manifest_media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            manifest_bytes: b"{}".to_vec(),
            manifest_digest: Digest::of_bytes(b"{}"),
            config_bytes: b"{\"config\":true}".to_vec(),
            config_digest: Digest::of_bytes(b"{\"config\":true}"),
            layers: vec![LayerBlob {
                diff_id: Digest::of_bytes(b"layer-diff"),
                compressed_digest: Digest::of_bytes(b"layer-compressed"),
                compressed_bytes: b"gz-bytes".to_vec(),
                uncompressed_tar: b"tar-bytes".to_vec(),
            }],
            repo_tags: vec!["example.com/app:latest".to_string()],
        }
    }

    #[test]
    fn writes_config_layers_and_manifest_entries() {
        let tarball = sample_tarball();
        let mut out = Vec::new();
        write(&tarball, &mut out).unwrap();

        let mut archive = tar::Archive::new(out.as_slice());
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();

        assert!(paths.contains(&format!("{}.json", tarball.config_digest.hex())));
        assert!(paths.iter().any(|p| p.ends_with("layer.tar")));
        assert!(paths.contains(&"manifest.json".to_string()));
    }
}
