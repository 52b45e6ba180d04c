//! Dot-notation field resolution

use crate::schema::{FieldDescriptor, FieldMap};

/// Resolve a dot-notation key (`"address.city"`) against a field tree
///
/// Every segment but the last must name an embedded-document field. The
/// descriptor of the last segment is returned as is.
pub fn resolve<'a>(fields: &'a FieldMap, dot_key: &str) -> Option<&'a FieldDescriptor> {
    let mut segments = dot_key.split('.').peekable();
    let mut current = fields;

    while let Some(segment) = segments.next() {
        let descriptor = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(descriptor);
        }
        current = descriptor.field_type.embedded_fields()?;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldType};

    fn fields() -> FieldMap {
        let mut geo = FieldMap::new();
        geo.insert("lat".to_string(), FieldDescriptor::number());
        geo.insert("lng".to_string(), FieldDescriptor::number());

        let mut address = FieldMap::new();
        address.insert("city".to_string(), FieldDescriptor::string().required());
        address.insert("geo".to_string(), FieldDescriptor::embedded(geo));

        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), FieldDescriptor::string());
        fields.insert("address".to_string(), FieldDescriptor::embedded(address));
        fields.insert(
            "tags".to_string(),
            FieldDescriptor::array_of(FieldType::Primitive(FieldKind::String)),
        );
        fields
    }

    #[test]
    fn test_top_level() {
        let fields = fields();
        assert_eq!(resolve(&fields, "name"), Some(&FieldDescriptor::string()));
    }

    #[test]
    fn test_nested() {
        let fields = fields();
        let city = resolve(&fields, "address.city").unwrap();
        assert!(city.required);
        assert_eq!(
            resolve(&fields, "address.geo.lat"),
            Some(&FieldDescriptor::number())
        );
    }

    #[test]
    fn test_terminal_embedded_is_returned_whole() {
        let fields = fields();
        let geo = resolve(&fields, "address.geo").unwrap();
        assert!(geo.field_type.embedded_fields().is_some());
    }

    #[test]
    fn test_not_found() {
        let fields = fields();
        assert!(resolve(&fields, "missing").is_none());
        assert!(resolve(&fields, "address.zip").is_none());
        // cannot descend into a primitive or an array
        assert!(resolve(&fields, "name.first").is_none());
        assert!(resolve(&fields, "tags.0").is_none());
        assert!(resolve(&fields, "").is_none());
        assert!(resolve(&fields, "address.").is_none());
    }
}
