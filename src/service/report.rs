use crate::error::OmsError;
use crate::service::aggregation::{AggregationNode, MAX_LEVEL};
use crate::service::gs1::server_code;
use crate::types::{AggregationReport, AggregationUnit, UtilisationReport};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

pub const AGGREGATION_TYPE: &str = "AGGREGATION";

#[derive(Debug, Clone, Default)]
pub struct AggregationOptions {
    pub participant_id: Option<String>,
    pub production_line_id: Option<String>,
    pub production_order_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UtilisationOptions {
    pub production_date: Option<String>,
    pub expiration_date: Option<String>,
    pub series_number: Option<String>,
}

/// A unit whose declared capacity was replaced by its actual item count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityCorrection {
    pub unit: String,
    pub declared: Option<u32>,
    pub actual: u32,
}

#[derive(Debug, Clone)]
pub struct BuiltAggregationReport {
    pub report: AggregationReport,
    pub corrections: Vec<CapacityCorrection>,
}

/// One aggregation unit per box/pallet node in the tree.
///
/// Capacity must equal the number of attached codes; mismatches are fixed in
/// place and returned as corrections. A unit with nothing attached fails.
pub fn build_aggregation_report(
    nodes: &[AggregationNode],
    options: &AggregationOptions,
) -> Result<BuiltAggregationReport, OmsError> {
    let mut units = Vec::new();
    let mut corrections = Vec::new();
    let mut stack: Vec<&AggregationNode> = nodes.iter().rev().collect();

    while let Some(node) = stack.pop() {
        stack.extend(node.children.iter().rev());
        // Items are not units; levels above pallets are not kept in storage either.
        if node.level == 0 || node.level > MAX_LEVEL {
            continue;
        }

        let sntins: Vec<String> = node
            .children
            .iter()
            .map(|child| server_code(&child.code))
            .collect();
        if sntins.is_empty() {
            return Err(OmsError::Validation(format!(
                "aggregation unit {} has no attached codes",
                node.code
            )));
        }
        let count = u32::try_from(sntins.len())
            .map_err(|_| OmsError::Validation(format!("unit {} is too large", node.code)))?;

        if node.capacity != Some(count) {
            warn!(
                unit = %node.code,
                declared = ?node.capacity,
                actual = count,
                "aggregation capacity corrected to item count"
            );
            corrections.push(CapacityCorrection {
                unit: node.code.clone(),
                declared: node.capacity,
                actual: count,
            });
        }

        units.push(AggregationUnit {
            unit_serial_number: server_code(&node.code),
            aggregation_type: AGGREGATION_TYPE.to_string(),
            aggregation_unit_capacity: count,
            aggregated_items_count: count,
            sntins,
            should_be_unbundled: false,
        });
    }

    if units.is_empty() {
        return Err(OmsError::Validation(
            "no aggregation units (level 1 or 2) found".to_string(),
        ));
    }

    Ok(BuiltAggregationReport {
        report: AggregationReport {
            participant_id: options.participant_id.clone(),
            production_line_id: options.production_line_id.clone(),
            production_order_id: options.production_order_id.clone(),
            aggregation_units: units,
        },
        corrections,
    })
}

/// Report the given codes as used for `usage_type`.
pub fn build_utilisation_report<S: AsRef<str>>(
    codes: &[S],
    usage_type: &str,
    options: &UtilisationOptions,
) -> Result<UtilisationReport, OmsError> {
    if codes.is_empty() {
        return Err(OmsError::Validation(
            "utilisation report needs at least one code".to_string(),
        ));
    }
    if usage_type.trim().is_empty() {
        return Err(OmsError::Validation("usage type is required".to_string()));
    }
    let mut seen = HashSet::new();
    let sntins: Vec<String> = codes
        .iter()
        .map(|c| server_code(c.as_ref()))
        .filter(|c| seen.insert(c.clone()))
        .collect();

    Ok(UtilisationReport {
        sntins,
        usage_type: usage_type.to_string(),
        production_date: options.production_date.clone(),
        expiration_date: options.expiration_date.clone(),
        series_number: options.series_number.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(code: &str) -> AggregationNode {
        AggregationNode {
            code: code.to_string(),
            level: 0,
            capacity: None,
            children: vec![],
        }
    }

    fn boxed(code: &str, capacity: Option<u32>, children: Vec<AggregationNode>) -> AggregationNode {
        AggregationNode {
            code: code.to_string(),
            level: 1,
            capacity,
            children,
        }
    }

    #[test]
    fn matching_capacity_is_kept() {
        let nodes = vec![boxed(
            "BOX1",
            Some(2),
            vec![item("0104604060005904215abc<GS>91EE05"), item("0104604060005904215abd")],
        )];
        let built = build_aggregation_report(&nodes, &AggregationOptions::default()).unwrap();
        assert!(built.corrections.is_empty());
        let unit = &built.report.aggregation_units[0];
        assert_eq!(unit.aggregation_unit_capacity, 2);
        assert_eq!(unit.aggregated_items_count, 2);
        assert_eq!(
            unit.sntins,
            vec!["0104604060005904215abc", "0104604060005904215abd"]
        );
    }

    #[test]
    fn mismatched_capacity_is_corrected() {
        let nodes = vec![
            boxed("BOX1", Some(10), vec![item("A"), item("B"), item("C")]),
            boxed("BOX2", None, vec![item("D")]),
        ];
        let built = build_aggregation_report(&nodes, &AggregationOptions::default()).unwrap();
        assert_eq!(
            built.corrections,
            vec![
                CapacityCorrection {
                    unit: "BOX1".into(),
                    declared: Some(10),
                    actual: 3
                },
                CapacityCorrection {
                    unit: "BOX2".into(),
                    declared: None,
                    actual: 1
                },
            ]
        );
        assert_eq!(built.report.aggregation_units[0].aggregation_unit_capacity, 3);
    }

    #[test]
    fn pallets_aggregate_boxes() {
        let pallet = AggregationNode {
            code: "PALLET".into(),
            level: 2,
            capacity: Some(2),
            children: vec![
                boxed("BOX1", Some(1), vec![item("A")]),
                boxed("BOX2", Some(1), vec![item("B")]),
            ],
        };
        let options = AggregationOptions {
            participant_id: Some("7700000000".into()),
            ..Default::default()
        };
        let built = build_aggregation_report(&[pallet], &options).unwrap();
        let serials: Vec<_> = built
            .report
            .aggregation_units
            .iter()
            .map(|u| u.unit_serial_number.as_str())
            .collect();
        assert_eq!(serials, vec!["PALLET", "BOX1", "BOX2"]);
        assert_eq!(built.report.aggregation_units[0].sntins, vec!["BOX1", "BOX2"]);
        assert_eq!(built.report.participant_id.as_deref(), Some("7700000000"));
    }

    #[test]
    fn levels_above_pallet_are_not_units() {
        let container = AggregationNode {
            code: "BIG".into(),
            level: 3,
            capacity: Some(1),
            children: vec![boxed("BOX1", Some(1), vec![item("A")])],
        };
        let built = build_aggregation_report(&[container.clone()], &AggregationOptions::default())
            .unwrap();
        let serials: Vec<_> = built
            .report
            .aggregation_units
            .iter()
            .map(|u| u.unit_serial_number.as_str())
            .collect();
        assert_eq!(serials, vec!["BOX1"]);

        let lone = AggregationNode {
            children: vec![item("A")],
            ..container
        };
        assert!(build_aggregation_report(&[lone], &AggregationOptions::default()).is_err());
    }

    #[test]
    fn empty_units_are_rejected() {
        let nodes = vec![boxed("BOX1", Some(5), vec![])];
        assert!(build_aggregation_report(&nodes, &AggregationOptions::default()).is_err());
        assert!(build_aggregation_report(&[item("A")], &AggregationOptions::default()).is_err());
    }

    #[test]
    fn utilisation_uses_server_codes() {
        let report = build_utilisation_report(
            &["0104604060005904215abc\u{1d}91EE05", "0104604060005904215abd"],
            "VERIFIED",
            &UtilisationOptions::default(),
        )
        .unwrap();
        assert_eq!(
            report.sntins,
            vec!["0104604060005904215abc", "0104604060005904215abd"]
        );
        let empty: [&str; 0] = [];
        assert!(build_utilisation_report(&empty, "VERIFIED", &UtilisationOptions::default()).is_err());
        assert!(build_utilisation_report(&["A"], " ", &UtilisationOptions::default()).is_err());
    }
}
