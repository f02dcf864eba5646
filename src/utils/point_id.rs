use uuid::Uuid;

/// Map an arbitrary chunk identifier onto a Qdrant point id.
///
/// Qdrant only accepts UUIDs (or unsigned ints) as point ids. Chunk ids like
/// `doc_42_page_1_step_6` are projected through UUID5 over the DNS namespace
/// so the mapping is deterministic and reconstructable from the chunk id
/// alone. Already UUID-shaped ids pass through unchanged.
pub fn point_id_for_chunk(chunk_id: &str) -> String {
    if Uuid::parse_str(chunk_id).is_ok() {
        return chunk_id.to_string();
    }

    Uuid::new_v5(&Uuid::NAMESPACE_DNS, chunk_id.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_projection() {
        let a = point_id_for_chunk("doc_42_page_1_step_6");
        let b = point_id_for_chunk("doc_42_page_1_step_6");
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_distinct_chunk_ids_distinct_points() {
        let a = point_id_for_chunk("doc_42_page_1_step_6");
        let b = point_id_for_chunk("doc_42_page_1_step_7");
        assert_ne!(a, b);
    }

    #[test]
    fn test_uuid_passthrough() {
        let existing = "0d4ed0f2-9c24-4f3c-9c37-1d0e0a3c2f11";
        assert_eq!(point_id_for_chunk(existing), existing);
    }
}
