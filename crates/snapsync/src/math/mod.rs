mod ema;
mod quantize;

pub use ema::ExponentialMovingAverage;
pub use quantize::{
    MIN_PRECISION, compress_rotation, decompress_rotation, delta_decode, delta_encode, dequantize,
    quantize, quantized_changed, rotation_changed,
};
