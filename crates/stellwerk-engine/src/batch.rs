//! CSV train-batch parsing for bulk spawn requests.
//!
//! The format is a fixed six-column header followed by one train per
//! line; `desired_stop_id` may be empty for transit-only trains:
//!
//! ```text
//! train_id,train_code,train_type_id,current_section_id,num_wagons,desired_stop_id
//! 1,R 2301,1,0,4,1
//! 2,IC 501,2,141,8,
//! ```

use std::error::Error;
use std::fmt;
use stellwerk_core::{SectionId, SpawnRequest, StopId, TrainId, TrainTypeId};

const HEADER: &str = "train_id,train_code,train_type_id,current_section_id,num_wagons,desired_stop_id";

/// Errors from [`parse_train_batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchError {
    /// The input has no header line.
    Empty,
    /// The header line does not match the expected columns.
    BadHeader {
        /// The offending line.
        got: String,
    },
    /// A data line has the wrong number of fields.
    FieldCount {
        /// 1-based line number.
        line: usize,
        /// Number of fields found.
        got: usize,
    },
    /// A field failed to parse.
    BadField {
        /// 1-based line number.
        line: usize,
        /// Column name.
        field: &'static str,
        /// The unparsable text.
        value: String,
    },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "batch is empty"),
            Self::BadHeader { got } => write!(f, "unexpected header '{got}'"),
            Self::FieldCount { line, got } => {
                write!(f, "line {line}: expected 6 fields, got {got}")
            }
            Self::BadField { line, field, value } => {
                write!(f, "line {line}: bad {field} '{value}'")
            }
        }
    }
}

impl Error for BatchError {}

/// Parse a CSV train batch into spawn requests.
///
/// Blank lines are skipped. Values are trimmed, so both LF and CRLF
/// inputs parse.
pub fn parse_train_batch(input: &str) -> Result<Vec<SpawnRequest>, BatchError> {
    let mut lines = input.lines().enumerate();
    let header = loop {
        match lines.next() {
            None => return Err(BatchError::Empty),
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line.trim(),
        }
    };
    if header != HEADER {
        return Err(BatchError::BadHeader {
            got: header.to_string(),
        });
    }

    let mut requests = Vec::new();
    for (i, line) in lines {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(BatchError::FieldCount {
                line: line_no,
                got: fields.len(),
            });
        }
        let parse_u32 = |field: &'static str, value: &str| {
            value.parse::<u32>().map_err(|_| BatchError::BadField {
                line: line_no,
                field,
                value: value.to_string(),
            })
        };
        let train_id = TrainId(parse_u32("train_id", fields[0])?);
        let code = fields[1].to_string();
        let train_type = TrainTypeId(parse_u32("train_type_id", fields[2])?);
        let entry_section = SectionId(parse_u32("current_section_id", fields[3])?);
        let num_wagons = fields[4].parse::<u8>().map_err(|_| BatchError::BadField {
            line: line_no,
            field: "num_wagons",
            value: fields[4].to_string(),
        })?;
        let desired_stop = if fields[5].is_empty() {
            None
        } else {
            Some(StopId(parse_u32("desired_stop_id", fields[5])?))
        };
        requests.push(SpawnRequest {
            train_id,
            code,
            train_type,
            entry_section,
            num_wagons,
            desired_stop,
        });
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_two_train_batch() {
        let input = "\
train_id,train_code,train_type_id,current_section_id,num_wagons,desired_stop_id
1,R 2301,1,0,4,1
2,IC 501,2,141,8,
";
        let batch = parse_train_batch(input).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].train_id, TrainId(1));
        assert_eq!(batch[0].code, "R 2301");
        assert_eq!(batch[0].desired_stop, Some(StopId(1)));
        assert_eq!(batch[1].entry_section, SectionId(141));
        assert_eq!(batch[1].num_wagons, 8);
        assert_eq!(batch[1].desired_stop, None);
    }

    #[test]
    fn rejects_wrong_header() {
        let err = parse_train_batch("id,code\n").unwrap_err();
        assert!(matches!(err, BatchError::BadHeader { .. }));
    }

    #[test]
    fn rejects_short_line_with_position() {
        let input = "\
train_id,train_code,train_type_id,current_section_id,num_wagons,desired_stop_id
1,R 1,1,0,4
";
        assert_eq!(
            parse_train_batch(input),
            Err(BatchError::FieldCount { line: 2, got: 5 })
        );
    }

    #[test]
    fn rejects_unparsable_field() {
        let input = "\
train_id,train_code,train_type_id,current_section_id,num_wagons,desired_stop_id
x,R 1,1,0,4,
";
        assert_eq!(
            parse_train_batch(input),
            Err(BatchError::BadField {
                line: 2,
                field: "train_id",
                value: "x".into()
            })
        );
    }

    #[test]
    fn skips_blank_lines_and_crlf() {
        let input = "train_id,train_code,train_type_id,current_section_id,num_wagons,desired_stop_id\r\n\r\n7,R 7,1,0,1,\r\n";
        let batch = parse_train_batch(input).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].train_id, TrainId(7));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(parse_train_batch(""), Err(BatchError::Empty));
        assert_eq!(parse_train_batch("\n\n"), Err(BatchError::Empty));
    }
}
