use serde::{Deserialize, Serialize};

/// Camera orientation (unit quaternion, w first) and position in the
/// reconstruction's frame.
///
/// Fields are declared in key order so the JSON comes out sorted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseResult {
    pub position: [f64; 3],
    pub rotation: [f64; 4],
}

/// Sent whenever no pose could be computed, so clients always get a
/// renderable answer.
pub const DEFAULT_POSE: PoseResult = PoseResult {
    rotation: [
        0.9933328925064184,
        0.10586746702934283,
        0.044306814130220924,
        -0.010897261640138333,
    ],
    position: [0.6256692252915096, 0.4400523835631032, 4.285847850723913],
};

impl PoseResult {
    /// Parses the solver's answer: the last non-empty line must be an image
    /// name followed by exactly seven numbers `qw qx qy qz tx ty tz`.
    pub fn parse_answer(answer: &str) -> Option<PoseResult> {
        let line = answer.lines().rev().find(|line| !line.trim().is_empty())?;
        let values = line
            .split_whitespace()
            .skip(1)
            .map(|token| token.parse::<f64>().ok())
            .collect::<Option<Vec<f64>>>()?;

        match values.as_slice() {
            &[qw, qx, qy, qz, tx, ty, tz] => Some(PoseResult {
                rotation: [qw, qx, qy, qz],
                position: [tx, ty, tz],
            }),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.iter().chain(self.position.iter()).all(|v| v.is_finite())
    }
}

/// Serializes a pose as indented JSON with sorted keys; `None`, or a pose
/// with non-finite components, yields [`DEFAULT_POSE`].
pub fn encode(pose: Option<&PoseResult>) -> Vec<u8> {
    let pose = pose.filter(|pose| pose.is_finite()).unwrap_or(&DEFAULT_POSE);

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    if let Err(err) = pose.serialize(&mut serializer) {
        log::error!("failed to serialize pose {pose:?}: {err}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn decode_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn empty_answer_encodes_the_default_pose() {
        let pose = PoseResult::parse_answer("");
        let body = encode(pose.as_ref());

        assert_eq!(
            decode_json(&body),
            json!({
                "rotation": [
                    0.9933328925064184,
                    0.10586746702934283,
                    0.044306814130220924,
                    -0.010897261640138333
                ],
                "position": [0.6256692252915096, 0.4400523835631032, 4.285847850723913]
            })
        );
    }

    #[test]
    fn malformed_answer_encodes_the_default_pose() {
        for answer in [
            "query_image.jpg 1 0 0",
            "query_image.jpg 1 0 0 0 x 0 0",
            "query_image.jpg 1 0 0 0 1 2 3 4",
        ] {
            assert_eq!(PoseResult::parse_answer(answer), None, "{answer}");
        }
        assert_eq!(decode_json(&encode(None)), decode_json(&encode(Some(&DEFAULT_POSE))));
    }

    #[test]
    fn non_finite_pose_is_replaced() {
        let pose = PoseResult::parse_answer("query_image.jpg nan 0 0 0 1 2 3").unwrap();
        assert_eq!(encode(Some(&pose)), encode(None));
    }

    #[test]
    fn last_line_carries_the_pose() {
        let answer = "older.jpg 1 0 0 0 9 9 9\nquery_image.jpg 0.5 0.5 0.5 0.5 1.25 -2 3\n\n";
        let pose = PoseResult::parse_answer(answer).unwrap();
        assert_eq!(pose.rotation, [0.5, 0.5, 0.5, 0.5]);
        assert_eq!(pose.position, [1.25, -2.0, 3.0]);
    }

    #[test]
    fn output_is_sorted_and_indented() {
        let text = String::from_utf8(encode(None)).unwrap();
        let position = text.find("\"position\"").unwrap();
        let rotation = text.find("\"rotation\"").unwrap();
        assert!(position < rotation);
        assert!(text.starts_with("{\n    \"position\": [\n        0.6256692252915096,"));
    }
}
