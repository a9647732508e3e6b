use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, Document};
use uuid::Uuid;

/// UUIDs are stored as BSON binary (subtype 4), matching
/// `bson::serde_helpers::uuid_1_as_binary` on the model structs. Filters
/// must use the same representation or they match nothing.
pub fn uuid_bson(id: Uuid) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.as_bytes().to_vec(),
    })
}

#[inline]
pub fn by_id(id: Uuid) -> Document {
    doc! { "_id": uuid_bson(id) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_filter_uses_uuid_binary_subtype() {
        let id = Uuid::new_v4();
        let filter = by_id(id);

        match filter.get("_id") {
            Some(Bson::Binary(bin)) => {
                assert_eq!(bin.subtype, BinarySubtype::Uuid);
                assert_eq!(bin.bytes, id.as_bytes().to_vec());
            }
            other => panic!("expected binary _id filter, got {:?}", other),
        }
    }
}
