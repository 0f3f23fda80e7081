//! Build script for the storefront crate.
//!
//! Fingerprints `main.css` and `storefront.js` so templates can link
//! `static/{css,js}/derived/<stem>.<hash>.<ext>` with immutable caching.
//! The hashes reach the templates through `CSS_HASH` and `JS_HASH`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

struct Asset {
    source: &'static str,
    derived_dir: &'static str,
    stem: &'static str,
    ext: &'static str,
    env_var: &'static str,
}

const ASSETS: [Asset; 2] = [
    Asset {
        source: "static/css/main.css",
        derived_dir: "static/css/derived",
        stem: "main",
        ext: "css",
        env_var: "CSS_HASH",
    },
    Asset {
        source: "static/js/storefront.js",
        derived_dir: "static/js/derived",
        stem: "storefront",
        ext: "js",
        env_var: "JS_HASH",
    },
];

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    for asset in &ASSETS {
        let hash = fingerprint(&manifest_dir, asset).unwrap_or_else(|message| {
            println!("cargo:warning={message}");
            String::new()
        });
        println!("cargo:rustc-env={}={hash}", asset.env_var);
    }
}

/// Hash an asset and copy it into its derived directory under the hashed name.
fn fingerprint(manifest_dir: &Path, asset: &Asset) -> Result<String, String> {
    let path = manifest_dir.join(asset.source);
    println!("cargo:rerun-if-changed={}", path.display());

    let content = fs::read(&path).map_err(|e| format!("Could not read {}: {e}", asset.source))?;
    let hash = format!("{:x}", Sha256::digest(&content));
    let short_hash = hash.get(..8).unwrap_or(&hash).to_string();

    let derived = manifest_dir.join(asset.derived_dir);
    fs::create_dir_all(&derived)
        .map_err(|e| format!("Could not create {}: {e}", asset.derived_dir))?;
    let target = derived.join(format!("{}.{short_hash}.{}", asset.stem, asset.ext));
    fs::copy(&path, &target).map_err(|e| format!("Could not copy {}: {e}", asset.source))?;

    Ok(short_hash)
}
