// InfluxDB line protocol: value normalization and encoding

mod encoder;
mod normalize;

pub use encoder::encode_line;
pub use normalize::{normalize_attribute, normalize_state, NormalizedValue, STATE_MAP};
