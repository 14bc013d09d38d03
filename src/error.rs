use thiserror::Error;

/// Errors raised by matrix operations.
///
/// Each variant is one failure kind: an index past the matrix bounds,
/// operand shapes that violate an operation's precondition, or an
/// argument outside an operation's domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("index out of bounds: ({row}, {col}) in a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("dimension mismatch in {op}: {}x{} vs {}x{}", left.0, left.1, right.0, right.1)]
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, MatrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_shapes() {
        let err = MatrixError::DimensionMismatch {
            op: "add",
            left: (2, 3),
            right: (3, 2),
        };
        assert_eq!(err.to_string(), "dimension mismatch in add: 2x3 vs 3x2");

        let err = MatrixError::IndexOutOfBounds { row: 4, col: 0, rows: 4, cols: 4 };
        assert!(err.to_string().contains("(4, 0)"));
    }
}
