//! Operation Model — the four transforms a revision can apply, modeled as a
//! sealed sum type rather than a class hierarchy so the adapter and the wire
//! codec can exhaustively pattern-match on the tag instead of relying on
//! dynamic dispatch.
//!
//! An `Operation` is a value type: two operations are equal iff their tag and
//! fields are equal. It never holds an I/O handle — applying one always goes
//! through `crate::pipeline`.

pub mod protocol;

use serde::{Deserialize, Serialize};

/// The four operation tags, matching the `op_type` column and the IEv1
/// header's `op_type` field (values 1..4, little-endian on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Rotate = 1,
    Flip = 2,
    Resize = 3,
    Compress = 4,
}

impl OpType {
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(OpType::Rotate),
            2 => Some(OpType::Flip),
            3 => Some(OpType::Resize),
            4 => Some(OpType::Compress),
            _ => None,
        }
    }

    pub fn tag(self) -> u16 {
        self as u16
    }
}

/// The typed parameters for each operation variant. Serializes to the
/// structured JSON form stored as `revisions.op_params` and accepted in REST
/// request bodies; `protocol` handles the binary IEv1 form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OpParams {
    Rotate { degrees: u16 },
    Flip { horizontal: bool, vertical: bool },
    Resize {
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
    },
    Compress { quality: u8 },
}

/// An Operation pairs a tag with its validated parameters. Construction does
/// not validate — callers must call `validate()` before `apply()`, the same
/// discipline the reference `validate() -> bool` / `apply()` split implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operation(pub OpParams);

impl Operation {
    pub fn op_type(&self) -> OpType {
        match self.0 {
            OpParams::Rotate { .. } => OpType::Rotate,
            OpParams::Flip { .. } => OpType::Flip,
            OpParams::Resize { .. } => OpType::Resize,
            OpParams::Compress { .. } => OpType::Compress,
        }
    }

    /// Pure predicate matching spec.md §3's "Operation parameter constraints".
    pub fn validate(&self) -> bool {
        match self.0 {
            OpParams::Rotate { degrees } => matches!(degrees, 90 | 180 | 270),
            OpParams::Flip { .. } => true,
            OpParams::Resize { width, height } => {
                if width.is_none() && height.is_none() {
                    return false;
                }
                let in_bounds = |v: Option<u32>| v.map_or(true, |v| (200..=4000).contains(&v));
                in_bounds(width) && in_bounds(height)
            }
            OpParams::Compress { quality } => (10..=100).contains(&quality),
        }
    }

    /// The JSON-serializable form persisted as `revisions.op_params`.
    pub fn to_params(&self) -> serde_json::Value {
        serde_json::to_value(self.0).expect("OpParams always serializes")
    }

    pub fn from_params(op_type: OpType, params: serde_json::Value) -> Option<Self> {
        let op: OpParams = serde_json::from_value(params).ok()?;
        let matches_tag = matches!(
            (op_type, op),
            (OpType::Rotate, OpParams::Rotate { .. })
                | (OpType::Flip, OpParams::Flip { .. })
                | (OpType::Resize, OpParams::Resize { .. })
                | (OpType::Compress, OpParams::Compress { .. })
        );
        matches_tag.then_some(Operation(op))
    }

    /// Invokes the Pipeline Adapter. Decodes `src_bytes` once, applies this
    /// operation, encodes once — no cross-operation chaining.
    pub fn apply(&self, src_bytes: &[u8]) -> crate::error::AppResult<crate::pipeline::Output> {
        crate::pipeline::apply(self, src_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_validates_only_multiples_of_ninety_up_to_270() {
        assert!(Operation(OpParams::Rotate { degrees: 90 }).validate());
        assert!(Operation(OpParams::Rotate { degrees: 180 }).validate());
        assert!(Operation(OpParams::Rotate { degrees: 270 }).validate());
        assert!(!Operation(OpParams::Rotate { degrees: 45 }).validate());
        assert!(!Operation(OpParams::Rotate { degrees: 0 }).validate());
        assert!(!Operation(OpParams::Rotate { degrees: 360 }).validate());
    }

    #[test]
    fn flip_both_false_is_accepted() {
        assert!(Operation(OpParams::Flip {
            horizontal: false,
            vertical: false
        })
        .validate());
    }

    #[test]
    fn resize_requires_at_least_one_dimension_in_bounds() {
        assert!(!Operation(OpParams::Resize {
            width: None,
            height: None
        })
        .validate());
        assert!(Operation(OpParams::Resize {
            width: Some(800),
            height: None
        })
        .validate());
        assert!(!Operation(OpParams::Resize {
            width: Some(100),
            height: None
        })
        .validate());
        assert!(!Operation(OpParams::Resize {
            width: Some(5000),
            height: None
        })
        .validate());
    }

    #[test]
    fn compress_quality_must_be_in_range() {
        assert!(Operation(OpParams::Compress { quality: 10 }).validate());
        assert!(Operation(OpParams::Compress { quality: 100 }).validate());
        assert!(!Operation(OpParams::Compress { quality: 5 }).validate());
        assert!(!Operation(OpParams::Compress { quality: 150 }).validate());
    }

    #[test]
    fn to_params_round_trips_through_from_params() {
        let op = Operation(OpParams::Resize {
            width: Some(800),
            height: None,
        });
        let recovered = Operation::from_params(op.op_type(), op.to_params()).unwrap();
        assert_eq!(op, recovered);
    }
}
