//! Driver ordering policy (`ZEL_DRIVERS_ORDER`).
//!
//! The ordering string is a comma separated list of
//!
//! - `INDEX`: the driver at that position of the discovered list;
//! - `TYPE`: every driver of that type bucket;
//! - `TYPE:INDEX`: the driver at that position within the type bucket,
//!
//! with `TYPE` one of `DISCRETE_GPU_ONLY`, `INTEGRATED_GPU_ONLY`, `GPU` and `NPU`. Tokens that do
//! not parse are skipped and drivers never mentioned keep their relative order after the ones
//! that are.

use zel_api::DriverType;

const WHITESPACE: &[char] = &[' ', '\t', '\n', '\r', '\x0c', '\x0b'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderBucket {
    DiscreteGpu,
    IntegratedGpu,
    Gpu,
    Npu,
}

impl OrderBucket {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DISCRETE_GPU_ONLY" => Some(OrderBucket::DiscreteGpu),
            "INTEGRATED_GPU_ONLY" => Some(OrderBucket::IntegratedGpu),
            "GPU" => Some(OrderBucket::Gpu),
            "NPU" => Some(OrderBucket::Npu),
            _ => None,
        }
    }

    /// Bucket a driver of `driver_type` is sorted into. Mixed drivers have none and can only be
    /// named by their global index.
    pub fn of(driver_type: DriverType) -> Option<Self> {
        match driver_type {
            DriverType::DiscreteGpu => Some(OrderBucket::DiscreteGpu),
            DriverType::IntegratedGpu => Some(OrderBucket::IntegratedGpu),
            DriverType::Gpu => Some(OrderBucket::Gpu),
            DriverType::Npu | DriverType::Other => Some(OrderBucket::Npu),
            DriverType::Mixed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSpec {
    Index(u32),
    Bucket(OrderBucket),
    BucketIndex(OrderBucket, u32),
}

fn parse_index(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn parse_spec(token: &str) -> Option<OrderSpec> {
    if let Some((bucket, index)) = token.split_once(':') {
        let bucket = OrderBucket::parse(bucket.trim_matches(WHITESPACE))?;
        let index = parse_index(index.trim_matches(WHITESPACE))?;
        return Some(OrderSpec::BucketIndex(bucket, index));
    }
    if let Some(bucket) = OrderBucket::parse(token) {
        return Some(OrderSpec::Bucket(bucket));
    }
    parse_index(token).map(OrderSpec::Index)
}

/// Parses an ordering string. Never fails: malformed tokens are dropped.
pub fn parse_order(raw: &str) -> Vec<OrderSpec> {
    raw.split(',')
        .map(|token| token.trim_matches(WHITESPACE))
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let spec = parse_spec(token);
            if spec.is_none() {
                tracing::debug!(token, "skipping invalid driver order token");
            }
            spec
        })
        .collect()
}

/// Returns the permutation of `0..types.len()` selected by `specs`.
pub fn apply_order(types: &[DriverType], specs: &[OrderSpec]) -> Vec<usize> {
    let bucket = |wanted: OrderBucket| -> Vec<usize> {
        (0..types.len())
            .filter(|&i| OrderBucket::of(types[i]) == Some(wanted))
            .collect()
    };

    let mut placed = vec![false; types.len()];
    let mut order = Vec::with_capacity(types.len());
    let mut place = |index: usize, order: &mut Vec<usize>| {
        if index < placed.len() && !placed[index] {
            placed[index] = true;
            order.push(index);
        }
    };

    for spec in specs {
        match *spec {
            OrderSpec::Index(index) => place(index as usize, &mut order),
            OrderSpec::Bucket(wanted) => {
                for index in bucket(wanted) {
                    place(index, &mut order);
                }
            }
            OrderSpec::BucketIndex(wanted, index) => {
                if let Some(&index) = bucket(wanted).get(index as usize) {
                    place(index, &mut order);
                }
            }
        }
    }
    for index in 0..types.len() {
        place(index, &mut order);
    }
    order
}
