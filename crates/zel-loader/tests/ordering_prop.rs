use proptest::prelude::*;
use zel_api::DriverType;
use zel_loader::{apply_order, parse_order, OrderSpec};

fn driver_type() -> impl Strategy<Value = DriverType> {
    prop_oneof![
        Just(DriverType::Other),
        Just(DriverType::DiscreteGpu),
        Just(DriverType::Gpu),
        Just(DriverType::IntegratedGpu),
        Just(DriverType::Mixed),
        Just(DriverType::Npu),
    ]
}

fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..12).prop_map(|i| i.to_string()),
        prop::sample::select(vec!["GPU", "NPU", "DISCRETE_GPU_ONLY", "INTEGRATED_GPU_ONLY"])
            .prop_map(str::to_string),
        (
            prop::sample::select(vec!["GPU", "NPU", "DISCRETE_GPU_ONLY"]),
            0u32..6
        )
            .prop_map(|(bucket, i)| format!("{bucket}:{i}")),
        "[ -~]{0,8}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0x0D_E4_0F),
        .. ProptestConfig::default()
    })]

    #[test]
    fn arbitrary_strings_never_panic(raw in "\\PC{0,64}") {
        let specs = parse_order(&raw);
        prop_assert!(specs.len() <= raw.split(',').count());
    }

    #[test]
    fn order_is_always_a_permutation(
        types in prop::collection::vec(driver_type(), 0..10),
        tokens in prop::collection::vec(token(), 0..8),
    ) {
        let specs = parse_order(&tokens.join(","));
        let order = apply_order(&types, &specs);

        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..types.len()).collect::<Vec<_>>());

        // Leading global indices, when distinct and in range, come first in that order.
        let leading: Vec<usize> = specs
            .iter()
            .map_while(|spec| match spec {
                OrderSpec::Index(i) if (*i as usize) < types.len() => Some(*i as usize),
                _ => None,
            })
            .collect();
        let mut seen = Vec::new();
        for index in leading {
            if !seen.contains(&index) {
                seen.push(index);
            }
        }
        prop_assert_eq!(&order[..seen.len()], &seen[..]);
    }
}
