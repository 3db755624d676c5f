use crate::error::MatDataError;

/// A dense, column-major matrix of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mat64 {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Mat64 {
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "Mat64 data length does not match rows * cols");
        Self { rows, cols, data }
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            rows: 1,
            cols: 1,
            data: vec![value],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self {
            rows: n,
            cols: n,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[col * self.rows + row]
    }
}

/// A scalar value within a [`MatData`] tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MatScalar {
    Real64(f64),
    Text(String),
    Matrix(Mat64),
}

/// A recursively tagged structured value: a scalar, an insertion-ordered
/// struct, or an ordered cell array. Cloning performs a full deep copy —
/// every variant owns its data, so `Clone` alone gives value semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum MatData {
    Scalar(MatScalar),
    Struct(Vec<(String, MatData)>),
    Cell(Vec<MatData>),
}

impl MatData {
    pub fn real64(value: f64) -> Self {
        MatData::Scalar(MatScalar::Real64(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        MatData::Scalar(MatScalar::Text(value.into()))
    }

    pub fn matrix(value: Mat64) -> Self {
        MatData::Scalar(MatScalar::Matrix(value))
    }

    pub fn make_struct() -> Self {
        MatData::Struct(Vec::new())
    }

    /// A cell array of `len` slots, each initialized to `0.0`.
    pub fn make_cell(len: usize) -> Self {
        MatData::Cell(vec![MatData::real64(0.0); len])
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, MatData::Struct(_))
    }

    pub fn is_cell(&self) -> bool {
        matches!(self, MatData::Cell(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, MatData::Scalar(_))
    }

    fn tag_name(&self) -> &'static str {
        match self {
            MatData::Scalar(MatScalar::Real64(_)) => "Real64",
            MatData::Scalar(MatScalar::Text(_)) => "Text",
            MatData::Scalar(MatScalar::Matrix(_)) => "Matrix",
            MatData::Struct(_) => "Struct",
            MatData::Cell(_) => "Cell",
        }
    }

    /// Reads this value as a real scalar. A 1x1 matrix is accepted, since
    /// integral fields read back from a backend surface as 1x1 matrices.
    pub fn as_f64(&self) -> Result<f64, MatDataError> {
        match self {
            MatData::Scalar(MatScalar::Real64(v)) => Ok(*v),
            MatData::Scalar(MatScalar::Matrix(m)) if m.rows() == 1 && m.cols() == 1 => {
                Ok(m.get(0, 0))
            }
            other => Err(MatDataError::WrongType {
                expected: "Real64",
                actual: other.tag_name(),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str, MatDataError> {
        match self {
            MatData::Scalar(MatScalar::Text(s)) => Ok(s.as_str()),
            other => Err(MatDataError::WrongType {
                expected: "Text",
                actual: other.tag_name(),
            }),
        }
    }

    pub fn as_matrix(&self) -> Result<&Mat64, MatDataError> {
        match self {
            MatData::Scalar(MatScalar::Matrix(m)) => Ok(m),
            other => Err(MatDataError::WrongType {
                expected: "Matrix",
                actual: other.tag_name(),
            }),
        }
    }

    pub fn as_struct(&self) -> Result<&[(String, MatData)], MatDataError> {
        match self {
            MatData::Struct(fields) => Ok(fields),
            other => Err(MatDataError::WrongType {
                expected: "Struct",
                actual: other.tag_name(),
            }),
        }
    }

    fn as_struct_mut(&mut self) -> Result<&mut Vec<(String, MatData)>, MatDataError> {
        let tag = self.tag_name();
        match self {
            MatData::Struct(fields) => Ok(fields),
            _ => Err(MatDataError::WrongType {
                expected: "Struct",
                actual: tag,
            }),
        }
    }

    pub fn as_cell(&self) -> Result<&[MatData], MatDataError> {
        match self {
            MatData::Cell(items) => Ok(items),
            other => Err(MatDataError::WrongType {
                expected: "Cell",
                actual: other.tag_name(),
            }),
        }
    }

    fn as_cell_mut(&mut self) -> Result<&mut Vec<MatData>, MatDataError> {
        let tag = self.tag_name();
        match self {
            MatData::Cell(items) => Ok(items),
            _ => Err(MatDataError::WrongType {
                expected: "Cell",
                actual: tag,
            }),
        }
    }

    /// Looks up a field by name. Errors if this is not a struct, or the
    /// field does not exist.
    pub fn field(&self, name: &str) -> Result<&MatData, MatDataError> {
        self.as_struct()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .ok_or_else(|| MatDataError::NoSuchField(name.to_string()))
    }

    /// Inserts or replaces a struct field, preserving existing field order
    /// and appending new fields at the end.
    pub fn set_field(&mut self, name: impl Into<String>, value: MatData) -> Result<(), MatDataError> {
        let name = name.into();
        let fields = self.as_struct_mut()?;
        match fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => fields.push((name, value)),
        }
        Ok(())
    }

    pub fn cell_get(&self, index: usize) -> Result<&MatData, MatDataError> {
        let items = self.as_cell()?;
        items.get(index).ok_or(MatDataError::CellIndexOutOfBounds {
            index,
            len: items.len(),
        })
    }

    pub fn cell_set(&mut self, index: usize, value: MatData) -> Result<(), MatDataError> {
        let items = self.as_cell_mut()?;
        let len = items.len();
        let slot = items.get_mut(index).ok_or(MatDataError::CellIndexOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_preserves_insertion_order() {
        let mut s = MatData::make_struct();
        s.set_field("a", MatData::real64(1.0)).unwrap();
        s.set_field("b", MatData::text("txt")).unwrap();
        s.set_field("c", MatData::make_cell(1)).unwrap();
        let fields = s.as_struct().unwrap();
        let names: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn set_field_replaces_in_place_without_reordering() {
        let mut s = MatData::make_struct();
        s.set_field("a", MatData::real64(1.0)).unwrap();
        s.set_field("b", MatData::real64(2.0)).unwrap();
        s.set_field("a", MatData::real64(99.0)).unwrap();
        let fields = s.as_struct().unwrap();
        assert_eq!(fields[0].0, "a");
        assert_eq!(fields[0].1.as_f64().unwrap(), 99.0);
        assert_eq!(fields[1].0, "b");
    }

    #[test]
    fn wrong_accessor_produces_typed_error() {
        let v = MatData::real64(1.0);
        let err = v.as_str().unwrap_err();
        assert_eq!(
            err,
            MatDataError::WrongType {
                expected: "Text",
                actual: "Real64"
            }
        );
    }

    #[test]
    fn one_by_one_matrix_is_accepted_as_scalar() {
        let v = MatData::matrix(Mat64::scalar(4.0));
        assert_eq!(v.as_f64().unwrap(), 4.0);
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let mut original = MatData::make_struct();
        original.set_field("cell", MatData::make_cell(2)).unwrap();
        let mut cloned = original.clone();
        cloned.set_field("cell", MatData::real64(7.0)).unwrap();
        assert!(original.field("cell").unwrap().is_cell());
    }

    #[test]
    fn cell_index_out_of_bounds_is_typed() {
        let c = MatData::make_cell(2);
        let err = c.cell_get(5).unwrap_err();
        assert_eq!(err, MatDataError::CellIndexOutOfBounds { index: 5, len: 2 });
    }
}
