//! Minimal ONNX protobuf reader
//!
//! InSwapper stores the matrix that projects ArcFace embeddings into its
//! latent space as the last initializer of the graph. Only the fields needed
//! to pull that tensor out are declared; prost skips everything else.

use std::path::Path;

use anyhow::{Context, Result};
use prost::Message;

use crate::utils::math::{l2_normalize, vec_mat_mul};

/// ONNX `TensorProto.DataType.FLOAT`
const ONNX_FLOAT: i32 = 1;

#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GraphProto {
    #[prost(message, repeated, tag = "5")]
    pub initializer: Vec<TensorProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorProto {
    #[prost(int64, repeated, tag = "1")]
    pub dims: Vec<i64>,
    #[prost(int32, tag = "2")]
    pub data_type: i32,
    #[prost(float, repeated, tag = "4")]
    pub float_data: Vec<f32>,
    #[prost(string, tag = "8")]
    pub name: String,
    #[prost(bytes = "vec", tag = "9")]
    pub raw_data: Vec<u8>,
}

/// Square embedding projection matrix (row-major)
#[derive(Debug, Clone)]
pub struct Emap {
    dim: usize,
    data: Vec<f32>,
}

impl Emap {
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != dim * dim {
            anyhow::bail!("emap has {} values, expected {}x{}", data.len(), dim, dim);
        }
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Project a normalized embedding and re-normalize the result
    pub fn project(&self, embedding: &[f32]) -> Result<Vec<f32>> {
        if embedding.len() != self.dim {
            anyhow::bail!(
                "Embedding has {} dimensions, swapper expects {}",
                embedding.len(),
                self.dim
            );
        }

        let mut latent = vec_mat_mul(embedding, &self.data, self.dim);
        l2_normalize(&mut latent);
        Ok(latent)
    }
}

/// Decode the float values of an initializer
fn tensor_values(tensor: &TensorProto) -> Result<Vec<f32>> {
    if tensor.data_type != ONNX_FLOAT {
        anyhow::bail!(
            "Initializer {} has data type {}, expected FLOAT",
            tensor.name,
            tensor.data_type
        );
    }

    if !tensor.float_data.is_empty() {
        return Ok(tensor.float_data.clone());
    }

    Ok(tensor
        .raw_data
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Extract the embedding map from serialized ONNX model bytes
pub fn emap_from_bytes(bytes: &[u8]) -> Result<Emap> {
    let model = ModelProto::decode(bytes).context("Failed to decode ONNX model")?;
    let tensor = model
        .graph
        .as_ref()
        .and_then(|graph| graph.initializer.last())
        .context("ONNX model has no initializers")?;

    let &[rows, cols] = tensor.dims.as_slice() else {
        anyhow::bail!("emap initializer {} has shape {:?}, expected 2-D", tensor.name, tensor.dims);
    };
    if rows != cols {
        anyhow::bail!("emap initializer {} is {}x{}, expected square", tensor.name, rows, cols);
    }

    Emap::new(rows as usize, tensor_values(tensor)?)
}

/// Read the embedding map from an InSwapper ONNX file
pub fn read_emap(path: &Path) -> Result<Emap> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    emap_from_bytes(&bytes).with_context(|| format!("Failed to read emap from {:?}", path))
}
