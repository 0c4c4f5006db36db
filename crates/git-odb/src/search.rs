//! Multi-source object search logic.
//!
//! Search order: loose -> packs (newest first) -> alternates.
//! This matches C git behavior where loose objects are preferred because
//! they may be newer (e.g., during a repack operation).

use git_hash::ObjectId;
use git_object::{Object, ObjectType};

use crate::{ObjectDatabase, ObjectInfo, OdbError};

/// Find an object by OID, searching all backends in order.
pub(crate) fn find_object(
    odb: &ObjectDatabase,
    oid: &ObjectId,
) -> Result<Option<Object>, OdbError> {
    if let Some(obj) = odb.loose.read(oid)? {
        return Ok(Some(obj));
    }

    let loose = &odb.loose;
    let fallback = |base_oid: &ObjectId| -> Option<(ObjectType, Vec<u8>)> {
        let obj = loose.read(base_oid).ok().flatten()?;
        Some((obj.object_type(), obj.serialize_content()))
    };
    if let Some(packed) = odb.pack_backend.read_object_resolving(oid, &fallback)? {
        let obj = Object::parse_content(packed.obj_type, &packed.data).map_err(|e| {
            OdbError::Corrupt {
                oid: *oid,
                reason: e.to_string(),
            }
        })?;
        return Ok(Some(obj));
    }

    for alt in &odb.alternates {
        if let Some(obj) = alt.read(oid)? {
            return Ok(Some(obj));
        }
    }

    Ok(None)
}

/// Find an object header by OID, searching all backends in order.
pub(crate) fn find_header(
    odb: &ObjectDatabase,
    oid: &ObjectId,
) -> Result<Option<ObjectInfo>, OdbError> {
    if let Some((obj_type, size)) = odb.loose.read_header(oid)? {
        return Ok(Some(ObjectInfo { obj_type, size }));
    }

    let loose = &odb.loose;
    let fallback = |base_oid: &ObjectId| -> Option<(ObjectType, Vec<u8>)> {
        let obj = loose.read(base_oid).ok().flatten()?;
        Some((obj.object_type(), obj.serialize_content()))
    };
    if let Some(packed) = odb.pack_backend.read_object_resolving(oid, &fallback)? {
        return Ok(Some(ObjectInfo {
            obj_type: packed.obj_type,
            size: packed.data.len(),
        }));
    }

    for alt in &odb.alternates {
        if let Some(info) = alt.read_header(oid)? {
            return Ok(Some(info));
        }
    }

    Ok(None)
}

/// Check if an object exists in any backend (fast, no decompression for packs).
pub(crate) fn object_exists(odb: &ObjectDatabase, oid: &ObjectId) -> bool {
    if odb.loose.contains(oid) {
        return true;
    }

    use crate::OdbBackend;
    if odb.pack_backend.contains(oid) {
        return true;
    }

    for alt in &odb.alternates {
        if alt.contains(oid) {
            return true;
        }
    }

    false
}
