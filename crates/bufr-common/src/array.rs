//! Typed, fill-value aware arrays.
//!
//! Query results and container fields are stored as a flat, row-major
//! buffer plus a dimension list. The first dimension is always the row
//! (location) dimension; trailing dimensions come from repeated groups.
//!
//! Missing entries are stored as the fill sentinel of the element type:
//! the maximum representable value for numeric types and the empty
//! string for text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// Element type of a [`DataArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Text,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ValueType::Text)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueType::Int32 | ValueType::UInt32 | ValueType::Int64 | ValueType::UInt64
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int32 => "int32",
            ValueType::UInt32 => "uint32",
            ValueType::Int64 => "int64",
            ValueType::UInt64 => "uint64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Text => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = CommonError;

    /// Parse the type names accepted by type overrides
    /// (`int`, `uint`, `int64`, `float`, `double`, `string`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "int" | "int32" => Ok(ValueType::Int32),
            "uint" | "uint32" => Ok(ValueType::UInt32),
            "int64" | "long" => Ok(ValueType::Int64),
            "uint64" => Ok(ValueType::UInt64),
            "float" | "float32" => Ok(ValueType::Float32),
            "double" | "float64" => Ok(ValueType::Float64),
            "string" | "str" | "text" => Ok(ValueType::Text),
            other => Err(CommonError::UnknownType(other.to_string())),
        }
    }
}

/// Numeric element types that can live in a [`DataArray`].
trait Numeric: Copy + PartialEq + fmt::Display {
    const FILL: Self;
    fn to_f64(self) -> f64;
    /// Convert from f64, truncating toward zero for integers.
    /// Returns None when the value is not representable.
    fn from_f64(value: f64) -> Option<Self>;
}

macro_rules! impl_integer {
    ($($t:ty),*) => {$(
        impl Numeric for $t {
            const FILL: Self = <$t>::MAX;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Option<Self> {
                let truncated = value.trunc();
                if value.is_finite()
                    && truncated >= <$t>::MIN as f64
                    && truncated < <$t>::MAX as f64
                {
                    Some(truncated as $t)
                } else {
                    None
                }
            }
        }
    )*};
}

impl_integer!(i32, u32, i64, u64);

impl Numeric for f32 {
    const FILL: Self = f32::MAX;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Option<Self> {
        if value.is_finite() && value.abs() <= f32::MAX as f64 {
            Some(value as f32)
        } else {
            None
        }
    }
}

impl Numeric for f64 {
    const FILL: Self = f64::MAX;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Option<Self> {
        value.is_finite().then_some(value)
    }
}

/// Flat storage for each supported element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ArrayData {
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Text(Vec<String>),
}

/// Apply `$body` to whichever vector the data holds.
macro_rules! each_variant {
    ($data:expr, $v:ident => $num:expr, $t:ident => $text:expr) => {
        match $data {
            ArrayData::Int32($v) => $num,
            ArrayData::UInt32($v) => $num,
            ArrayData::Int64($v) => $num,
            ArrayData::UInt64($v) => $num,
            ArrayData::Float32($v) => $num,
            ArrayData::Float64($v) => $num,
            ArrayData::Text($t) => $text,
        }
    };
}

/// Rebuild the same variant from a transformed vector.
macro_rules! map_variant {
    ($data:expr, $v:ident => $num:expr, $t:ident => $text:expr) => {
        match $data {
            ArrayData::Int32($v) => ArrayData::Int32($num),
            ArrayData::UInt32($v) => ArrayData::UInt32($num),
            ArrayData::Int64($v) => ArrayData::Int64($num),
            ArrayData::UInt64($v) => ArrayData::UInt64($num),
            ArrayData::Float32($v) => ArrayData::Float32($num),
            ArrayData::Float64($v) => ArrayData::Float64($num),
            ArrayData::Text($t) => ArrayData::Text($text),
        }
    };
}

/// Run `$body` on two arrays of the same variant; None when they differ.
macro_rules! paired {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr) => {
        match ($a, $b) {
            (ArrayData::Int32($x), ArrayData::Int32($y)) => Some($body),
            (ArrayData::UInt32($x), ArrayData::UInt32($y)) => Some($body),
            (ArrayData::Int64($x), ArrayData::Int64($y)) => Some($body),
            (ArrayData::UInt64($x), ArrayData::UInt64($y)) => Some($body),
            (ArrayData::Float32($x), ArrayData::Float32($y)) => Some($body),
            (ArrayData::Float64($x), ArrayData::Float64($y)) => Some($body),
            (ArrayData::Text($x), ArrayData::Text($y)) => Some($body),
            _ => None,
        }
    };
}

fn numeric_from<T: Numeric>(values: &[Option<f64>]) -> Vec<T> {
    values
        .iter()
        .map(|v| v.and_then(T::from_f64).unwrap_or(T::FILL))
        .collect()
}

fn is_fill<T: Numeric>(value: &T) -> bool {
    *value == T::FILL
}

fn take_numeric<T: Numeric>(src: &[T], indices: &[Option<usize>]) -> Vec<T> {
    take_from(src, indices, T::FILL)
}

fn take_from<T: Clone>(src: &[T], indices: &[Option<usize>], fill: T) -> Vec<T> {
    indices
        .iter()
        .map(|idx| {
            idx.and_then(|i| src.get(i))
                .cloned()
                .unwrap_or_else(|| fill.clone())
        })
        .collect()
}

fn cast_numeric<S: Numeric, T: Numeric>(src: &[S]) -> Vec<T> {
    src.iter()
        .map(|&v| {
            if v == S::FILL {
                T::FILL
            } else {
                T::from_f64(v.to_f64()).unwrap_or(T::FILL)
            }
        })
        .collect()
}

fn map_numeric_values<T: Numeric>(src: &[T], f: &impl Fn(f64) -> f64) -> Vec<T> {
    src.iter()
        .map(|&v| {
            if v == T::FILL {
                T::FILL
            } else {
                T::from_f64(f(v.to_f64())).unwrap_or(T::FILL)
            }
        })
        .collect()
}

fn numeric_to_text<T: Numeric>(src: &[T]) -> Vec<String> {
    src.iter()
        .map(|&v| if v == T::FILL { String::new() } else { v.to_string() })
        .collect()
}

fn text_to_numeric<T: Numeric>(src: &[String], target: ValueType) -> CommonResult<Vec<T>> {
    src.iter()
        .map(|s| {
            if s.is_empty() {
                return Ok(T::FILL);
            }
            s.trim()
                .parse::<f64>()
                .ok()
                .and_then(T::from_f64)
                .ok_or_else(|| CommonError::InvalidCast {
                    value: s.clone(),
                    target: target.to_string(),
                })
        })
        .collect()
}

impl ArrayData {
    pub fn value_type(&self) -> ValueType {
        match self {
            ArrayData::Int32(_) => ValueType::Int32,
            ArrayData::UInt32(_) => ValueType::UInt32,
            ArrayData::Int64(_) => ValueType::Int64,
            ArrayData::UInt64(_) => ValueType::UInt64,
            ArrayData::Float32(_) => ValueType::Float32,
            ArrayData::Float64(_) => ValueType::Float64,
            ArrayData::Text(_) => ValueType::Text,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len(), t => t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filled(value_type: ValueType, len: usize) -> ArrayData {
        match value_type {
            ValueType::Int32 => ArrayData::Int32(vec![i32::FILL; len]),
            ValueType::UInt32 => ArrayData::UInt32(vec![u32::FILL; len]),
            ValueType::Int64 => ArrayData::Int64(vec![i64::FILL; len]),
            ValueType::UInt64 => ArrayData::UInt64(vec![u64::FILL; len]),
            ValueType::Float32 => ArrayData::Float32(vec![f32::FILL; len]),
            ValueType::Float64 => ArrayData::Float64(vec![f64::FILL; len]),
            ValueType::Text => ArrayData::Text(vec![String::new(); len]),
        }
    }

    fn is_missing(&self, idx: usize) -> bool {
        each_variant!(
            self,
            v => v.get(idx).map_or(true, is_fill),
            t => t.get(idx).map_or(true, |s| s.is_empty())
        )
    }

    fn take(&self, indices: &[Option<usize>]) -> ArrayData {
        map_variant!(
            self,
            v => take_numeric(v, indices),
            t => take_from(t, indices, String::new())
        )
    }
}

/// One element of a row key used for exact-equality deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyAtom {
    Int(i64),
    UInt(u64),
    /// Bit pattern of the value widened to f64.
    Float(u64),
    Text(String),
}

/// A typed array with a row-major dimension list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArray {
    dims: Vec<usize>,
    data: ArrayData,
}

impl DataArray {
    /// Create an array, checking that `dims` covers exactly the data.
    pub fn new(data: ArrayData, dims: Vec<usize>) -> CommonResult<Self> {
        let dims = if dims.is_empty() { vec![data.len()] } else { dims };
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(CommonError::ShapeMismatch(format!(
                "dimensions {:?} describe {} values but {} were given",
                dims,
                expected,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Numeric array from optional values; `None` becomes the fill sentinel.
    pub fn from_values(
        value_type: ValueType,
        dims: Vec<usize>,
        values: &[Option<f64>],
    ) -> CommonResult<Self> {
        let data = match value_type {
            ValueType::Int32 => ArrayData::Int32(numeric_from(values)),
            ValueType::UInt32 => ArrayData::UInt32(numeric_from(values)),
            ValueType::Int64 => ArrayData::Int64(numeric_from(values)),
            ValueType::UInt64 => ArrayData::UInt64(numeric_from(values)),
            ValueType::Float32 => ArrayData::Float32(numeric_from(values)),
            ValueType::Float64 => ArrayData::Float64(numeric_from(values)),
            ValueType::Text => {
                return Err(CommonError::TypeMismatch {
                    expected: "numeric".to_string(),
                    found: value_type.to_string(),
                })
            }
        };
        Self::new(data, dims)
    }

    /// Text array from optional strings; `None` becomes the empty string.
    pub fn from_text(dims: Vec<usize>, values: Vec<Option<String>>) -> CommonResult<Self> {
        let data = values.into_iter().map(Option::unwrap_or_default).collect();
        Self::new(ArrayData::Text(data), dims)
    }

    /// Array of the given shape holding only fill values.
    pub fn filled(value_type: ValueType, dims: Vec<usize>) -> Self {
        let len = dims.iter().product();
        Self {
            dims,
            data: ArrayData::filled(value_type, len),
        }
    }

    pub fn from_f32(values: Vec<f32>) -> Self {
        Self {
            dims: vec![values.len()],
            data: ArrayData::Float32(values),
        }
    }

    pub fn from_i32(values: Vec<i32>) -> Self {
        Self {
            dims: vec![values.len()],
            data: ArrayData::Int32(values),
        }
    }

    pub fn from_strings(values: Vec<String>) -> Self {
        Self {
            dims: vec![values.len()],
            data: ArrayData::Text(values),
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn value_type(&self) -> ValueType {
        self.data.value_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of rows (size of the first dimension).
    pub fn rows(&self) -> usize {
        self.dims.first().copied().unwrap_or(0)
    }

    /// Trailing dimensions after the row dimension.
    pub fn inner_dims(&self) -> &[usize] {
        self.dims.get(1..).unwrap_or(&[])
    }

    /// Number of elements in one row.
    pub fn row_len(&self) -> usize {
        self.inner_dims().iter().product()
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        self.data.is_missing(idx)
    }

    /// The fill sentinel for this array's element type, rendered as a string.
    pub fn fill_value(&self) -> String {
        match self.value_type() {
            ValueType::Int32 => i32::FILL.to_string(),
            ValueType::UInt32 => u32::FILL.to_string(),
            ValueType::Int64 => i64::FILL.to_string(),
            ValueType::UInt64 => u64::FILL.to_string(),
            ValueType::Float32 => f32::FILL.to_string(),
            ValueType::Float64 => f64::FILL.to_string(),
            ValueType::Text => String::new(),
        }
    }

    /// Element as f64, None when missing or textual.
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        if self.is_missing(idx) {
            return None;
        }
        each_variant!(&self.data, v => v.get(idx).map(|x| x.to_f64()), _t => None)
    }

    /// Element truncated to i64, None when missing or textual.
    pub fn get_i64(&self, idx: usize) -> Option<i64> {
        self.get_f64(idx).map(|v| v.trunc() as i64)
    }

    /// Element rendered as text, None when missing.
    pub fn get_string(&self, idx: usize) -> Option<String> {
        if self.is_missing(idx) {
            return None;
        }
        each_variant!(&self.data, v => v.get(idx).map(|x| x.to_string()), t => t.get(idx).cloned())
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            ArrayData::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            ArrayData::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            ArrayData::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match &self.data {
            ArrayData::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Freshly allocated copy converted to `target`.
    ///
    /// Fill values map to the target fill; floats truncate toward zero when
    /// cast to integers, and values outside the target range become fill.
    pub fn cast(&self, target: ValueType) -> CommonResult<DataArray> {
        if target == self.value_type() {
            return Ok(self.clone());
        }

        let data = match (&self.data, target) {
            (ArrayData::Text(t), ValueType::Int32) => ArrayData::Int32(text_to_numeric(t, target)?),
            (ArrayData::Text(t), ValueType::UInt32) => ArrayData::UInt32(text_to_numeric(t, target)?),
            (ArrayData::Text(t), ValueType::Int64) => ArrayData::Int64(text_to_numeric(t, target)?),
            (ArrayData::Text(t), ValueType::UInt64) => ArrayData::UInt64(text_to_numeric(t, target)?),
            (ArrayData::Text(t), ValueType::Float32) => ArrayData::Float32(text_to_numeric(t, target)?),
            (ArrayData::Text(t), ValueType::Float64) => ArrayData::Float64(text_to_numeric(t, target)?),
            (ArrayData::Text(t), ValueType::Text) => ArrayData::Text(t.clone()),
            (data, ValueType::Text) => {
                each_variant!(data, v => ArrayData::Text(numeric_to_text(v)), t => ArrayData::Text(t.clone()))
            }
            (data, ValueType::Int32) => {
                each_variant!(data, v => ArrayData::Int32(cast_numeric(v)), t => ArrayData::Text(t.clone()))
            }
            (data, ValueType::UInt32) => {
                each_variant!(data, v => ArrayData::UInt32(cast_numeric(v)), t => ArrayData::Text(t.clone()))
            }
            (data, ValueType::Int64) => {
                each_variant!(data, v => ArrayData::Int64(cast_numeric(v)), t => ArrayData::Text(t.clone()))
            }
            (data, ValueType::UInt64) => {
                each_variant!(data, v => ArrayData::UInt64(cast_numeric(v)), t => ArrayData::Text(t.clone()))
            }
            (data, ValueType::Float32) => {
                each_variant!(data, v => ArrayData::Float32(cast_numeric(v)), t => ArrayData::Text(t.clone()))
            }
            (data, ValueType::Float64) => {
                each_variant!(data, v => ArrayData::Float64(cast_numeric(v)), t => ArrayData::Text(t.clone()))
            }
        };

        Ok(DataArray {
            dims: self.dims.clone(),
            data,
        })
    }

    /// Same data viewed with different dimensions (element count must match).
    pub fn reshaped(&self, dims: Vec<usize>) -> CommonResult<DataArray> {
        DataArray::new(self.data.clone(), dims)
    }

    /// Gather elements by flat index into a new array of shape `dims`;
    /// `None` entries become fill.
    pub fn take(&self, indices: &[Option<usize>], dims: Vec<usize>) -> CommonResult<DataArray> {
        DataArray::new(self.data.take(indices), dims)
    }

    /// Copy of the given rows, in the given order.
    pub fn slice_rows(&self, rows: &[usize]) -> CommonResult<DataArray> {
        let row_len = self.row_len();
        let mut indices = Vec::with_capacity(rows.len() * row_len);
        for &row in rows {
            if row >= self.rows() {
                return Err(CommonError::ShapeMismatch(format!(
                    "row {} out of range for {} rows",
                    row,
                    self.rows()
                )));
            }
            indices.extend((row * row_len..(row + 1) * row_len).map(Some));
        }

        let mut dims = self.dims.clone();
        dims[0] = rows.len();
        self.take(&indices, dims)
    }

    /// Right-pad the trailing dimensions up to `inner` with fill values.
    pub fn pad_inner(&self, inner: &[usize]) -> CommonResult<DataArray> {
        let current = self.inner_dims();
        if current == inner {
            return Ok(self.clone());
        }
        if current.len() != inner.len() || current.iter().zip(inner).any(|(c, n)| c > n) {
            return Err(CommonError::ShapeMismatch(format!(
                "cannot pad inner dimensions {:?} to {:?}",
                current, inner
            )));
        }

        let old_row_len = self.row_len();
        let new_row_len: usize = inner.iter().product();
        let mut indices = Vec::with_capacity(self.rows() * new_row_len);
        for row in 0..self.rows() {
            for pos in 0..new_row_len {
                indices.push(
                    relocate(pos, inner, current).map(|old| row * old_row_len + old),
                );
            }
        }

        let mut dims = vec![self.rows()];
        dims.extend_from_slice(inner);
        self.take(&indices, dims)
    }

    /// Concatenate `other` along the row dimension.
    ///
    /// Trailing dimensions that differ are padded to the larger extent.
    pub fn append(&mut self, other: &DataArray) -> CommonResult<()> {
        if self.value_type() != other.value_type() {
            return Err(CommonError::ShapeMismatch(format!(
                "cannot append {} data to {} data",
                other.value_type(),
                self.value_type()
            )));
        }
        if self.dims.len() != other.dims.len() {
            return Err(CommonError::ShapeMismatch(format!(
                "cannot append {}-d data to {}-d data",
                other.dims.len(),
                self.dims.len()
            )));
        }

        let inner: Vec<usize> = self
            .inner_dims()
            .iter()
            .zip(other.inner_dims())
            .map(|(a, b)| *a.max(b))
            .collect();

        if self.inner_dims() != inner.as_slice() {
            *self = self.pad_inner(&inner)?;
        }
        let padded;
        let other = if other.inner_dims() != inner.as_slice() {
            padded = other.pad_inner(&inner)?;
            &padded
        } else {
            other
        };

        paired!(&mut self.data, &other.data, |a, b| a.extend_from_slice(b)).ok_or_else(|| {
            CommonError::ShapeMismatch("element types differ".to_string())
        })?;
        self.dims[0] += other.rows();
        Ok(())
    }

    /// Overwrite `rows` of this array with the rows of `src`, in order.
    pub fn scatter_rows(&mut self, rows: &[usize], src: &DataArray) -> CommonResult<()> {
        if src.rows() != rows.len() {
            return Err(CommonError::ShapeMismatch(format!(
                "{} rows given for {} target rows",
                src.rows(),
                rows.len()
            )));
        }
        if src.inner_dims() != self.inner_dims() {
            return Err(CommonError::ShapeMismatch(format!(
                "inner dimensions {:?} do not match {:?}",
                src.inner_dims(),
                self.inner_dims()
            )));
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.rows()) {
            return Err(CommonError::ShapeMismatch(format!(
                "row {} out of range for {} rows",
                bad,
                self.rows()
            )));
        }

        let row_len = self.row_len();
        paired!(&mut self.data, &src.data, |dst, from| {
            for (k, &row) in rows.iter().enumerate() {
                dst[row * row_len..(row + 1) * row_len]
                    .clone_from_slice(&from[k * row_len..(k + 1) * row_len]);
            }
        })
        .ok_or_else(|| CommonError::TypeMismatch {
            expected: self.value_type().to_string(),
            found: src.value_type().to_string(),
        })
    }

    /// Exact-equality key for one row.
    pub fn row_key(&self, row: usize) -> Vec<KeyAtom> {
        let row_len = self.row_len();
        let range = row * row_len..(row + 1) * row_len;
        match &self.data {
            ArrayData::Int32(v) => v[range].iter().map(|x| KeyAtom::Int(*x as i64)).collect(),
            ArrayData::Int64(v) => v[range].iter().map(|x| KeyAtom::Int(*x)).collect(),
            ArrayData::UInt32(v) => v[range].iter().map(|x| KeyAtom::UInt(*x as u64)).collect(),
            ArrayData::UInt64(v) => v[range].iter().map(|x| KeyAtom::UInt(*x)).collect(),
            ArrayData::Float32(v) => v[range]
                .iter()
                .map(|x| KeyAtom::Float((*x as f64).to_bits()))
                .collect(),
            ArrayData::Float64(v) => v[range].iter().map(|x| KeyAtom::Float(x.to_bits())).collect(),
            ArrayData::Text(v) => v[range].iter().map(|x| KeyAtom::Text(x.clone())).collect(),
        }
    }

    /// Apply `f` to every non-missing numeric value, keeping the element type.
    pub fn map_numeric(&self, f: impl Fn(f64) -> f64) -> CommonResult<DataArray> {
        if !self.value_type().is_numeric() {
            return Err(CommonError::TypeMismatch {
                expected: "numeric".to_string(),
                found: self.value_type().to_string(),
            });
        }
        let data = map_variant!(&self.data, v => map_numeric_values(v, &f), t => t.clone());
        Ok(DataArray {
            dims: self.dims.clone(),
            data,
        })
    }

    /// Multiply every non-missing value by `factor`.
    pub fn scaled(&self, factor: f64) -> CommonResult<DataArray> {
        self.map_numeric(|v| v * factor)
    }

    /// Add `offset` to every non-missing value.
    pub fn offset(&self, offset: f64) -> CommonResult<DataArray> {
        self.map_numeric(|v| v + offset)
    }
}

/// Map a flat position in a padded layout back to the unpadded layout.
fn relocate(pos: usize, padded: &[usize], original: &[usize]) -> Option<usize> {
    let mut remainder = pos;
    let mut coords = vec![0; padded.len()];
    for (axis, extent) in padded.iter().enumerate().rev() {
        coords[axis] = remainder % extent;
        remainder /= extent;
    }

    let mut old = 0;
    for (axis, coord) in coords.iter().enumerate() {
        if *coord >= original[axis] {
            return None;
        }
        old = old * original[axis] + coord;
    }
    Some(old)
}
