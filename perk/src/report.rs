use common::{FileFormat, SerdeFormatResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricReport {
    pub name: String,
    pub unit: String,
    /// Display form of the value; pairs are tab separated.
    pub value: String,
    /// False when the metric was disabled by a binding problem.
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub metrics: Vec<MetricReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EvaluationReport {
    pub fn metric(&self, name: &str) -> Option<&MetricReport> {
        self.metrics.iter().find(|metric| metric.name == name)
    }

    pub fn to_yaml(&self) -> SerdeFormatResult<String> {
        common::serialize(self, FileFormat::Yaml)
    }
    pub fn to_json(&self) -> SerdeFormatResult<String> {
        common::serialize(self, FileFormat::Json)
    }
    pub fn from_yaml(yaml: &str) -> SerdeFormatResult<Self> {
        common::deserialize(yaml, FileFormat::Yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> EvaluationReport {
        EvaluationReport {
            samples: 12,
            metrics: vec![MetricReport {
                name: "Bimanual Dexterity: Translational & Rotational".to_string(),
                unit: "rho".to_string(),
                value: "0.5\t-0.25".to_string(),
                enabled: true,
            }],
            warnings: vec![],
        }
    }

    #[test]
    fn yaml_keeps_tab_separated_pairs() -> anyhow::Result<()> {
        let yaml = report().to_yaml()?;
        assert!(!yaml.contains("warnings"));
        assert!(!yaml.contains('\r'));

        let back = EvaluationReport::from_yaml(&yaml)?;
        assert_eq!(back, report());
        assert_eq!(back.metric("Bimanual Dexterity: Translational & Rotational").unwrap().value, "0.5\t-0.25");

        Ok(())
    }

    #[test]
    fn json_lists_warnings() -> anyhow::Result<()> {
        let mut report = report();
        report.warnings.push("Targets Hit: no Targets anatomy bound".to_string());
        let json = report.to_json()?;
        assert!(json.contains("\"warnings\""));
        assert!(json.ends_with('\n'));

        Ok(())
    }
}
