/// Sharded storage path resolution
///
/// Objects are addressed as `{hash}.{format}` and laid out under two
/// levels of hash-prefix directories so no single directory accumulates
/// millions of files: `3f9a7c....webp` -> `3f/9a/3f9a7c....webp`.

/// Object name for a content hash and canonical format.
pub fn object_name(hash: &str, format: &str) -> String {
    format!("{}.{}", hash, format)
}

/// Storage-relative sharded path for an object name.
///
/// Pure and total: names too short to shard fall back to a `_` bucket.
pub fn sharded_rel_path(name: &str) -> String {
    if name.len() >= 4 && name.is_char_boundary(2) && name.is_char_boundary(4) {
        format!("{}/{}/{}", &name[0..2], &name[2..4], name)
    } else {
        format!("_/{}", name)
    }
}
