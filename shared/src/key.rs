use crate::types::Operations;
use std::fmt;

/// Segment used when a request carries no operations (originals, video thumbnails).
const NO_OPERATIONS: &str = "default";

/// Storage key of a derivative: `{project}/{objectPath}/{op}={value},...`
///
/// Operations are serialized sorted by name, so the same operation set always
/// produces the same key no matter the order the client sent it in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivativeKey(String);

impl DerivativeKey {
    pub fn build(project_id: &str, object_path: &str, operations: &Operations) -> Self {
        let mut pairs: Vec<(&'static str, String)> = operations
            .iter()
            .map(|op| (op.name().as_str(), op.value()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let suffix = if pairs.is_empty() {
            NO_OPERATIONS.to_string()
        } else {
            pairs
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join(",")
        };

        DerivativeKey(format!("{}/{}/{}", project_id, object_path, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DerivativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;

    fn ops(list: Vec<Operation>) -> Operations {
        let mut ops = Operations::new();
        for op in list {
            ops.push(op).unwrap();
        }
        ops
    }

    #[test]
    fn test_key_ignores_insertion_order() {
        let all = vec![
            Operation::Width(300),
            Operation::Height(200),
            Operation::Format("webp".into()),
            Operation::Quality(80),
        ];
        let expected = DerivativeKey::build("geerly", "photos/a.png", &ops(all.clone()));
        assert_eq!(
            expected.as_str(),
            "geerly/photos/a.png/format=webp,height=200,quality=80,width=300"
        );

        // every rotation and the reverse
        for shift in 0..all.len() {
            let mut rotated = all.clone();
            rotated.rotate_left(shift);
            assert_eq!(DerivativeKey::build("geerly", "photos/a.png", &ops(rotated.clone())), expected);
            rotated.reverse();
            assert_eq!(DerivativeKey::build("geerly", "photos/a.png", &ops(rotated)), expected);
        }
    }

    #[test]
    fn test_key_without_operations() {
        let key = DerivativeKey::build("geerly", "clips/a.mp4", &Operations::new());
        assert_eq!(key.to_string(), "geerly/clips/a.mp4/default");
    }

    #[test]
    fn test_key_is_project_scoped() {
        let o = ops(vec![Operation::Width(10)]);
        assert_ne!(
            DerivativeKey::build("a", "x.png", &o),
            DerivativeKey::build("b", "x.png", &o)
        );
    }
}
