//! The model catalog and evaluator factory.
//!
//! A catalog maps a model name to its specification: an evaluator-kind
//! tag, a coefficient file name, an optional transform, an optional named
//! preprocessing hook, and descriptive metadata the evaluators carry
//! opaquely. The bundled catalog is constructed explicitly at startup
//! (there is no ambient global), and user catalogs with the same schema
//! load from TOML.
//!
//! The factory resolves a specification once into a concrete evaluator.
//! Preprocessing algorithms (e.g. the gold-standard normalization some
//! pace-of-aging models require) are external collaborators: catalog
//! entries name the hook, callers supply the implementation, and
//! construction fails audibly when it is absent.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coefficients::{LinearCoefficients, SexReference};
use crate::data::DataError;
use crate::linear::{LinearMethylationModel, PreprocessFn};
use crate::sex::SexEstimationModel;
use crate::transform::ScoreTransform;
use crate::types::MethylationModel;

/// Which evaluator a catalog entry constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluatorKind {
    Linear,
    SexEstimation,
    /// Published models whose evaluator does not exist yet. Constructing
    /// one fails explicitly; it never silently returns a placeholder.
    NotImplemented,
}

/// Descriptive catalog metadata. Not interpreted by the evaluators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tissue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// The machine-readable part of a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub kind: EvaluatorKind,
    /// Coefficient resource, addressed by file name under the data
    /// directory handed to the factory.
    pub file: String,
    /// Name of a preprocessing hook the model requires, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocess: Option<String>,
    // Kept last so TOML serialisation emits scalar keys before the
    // transform's inline table.
    #[serde(default, skip_serializing_if = "is_identity")]
    pub transform: ScoreTransform,
}

fn is_identity(transform: &ScoreTransform) -> bool {
    *transform == ScoreTransform::Identity
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(flatten)]
    pub metadata: ModelMetadata,
    pub model: ModelSpec,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("model '{0}' has no implemented evaluator")]
    NotImplemented(String),
    #[error("model '{model}' requires the preprocessing hook '{hook}', which was not supplied")]
    UnknownPreprocessor { model: String, hook: String },
    #[error("model '{model}' is of a kind that does not accept a preprocessing hook")]
    PreprocessUnsupported { model: String },
    #[error("failed to load coefficient table: {0}")]
    Coefficients(#[from] DataError),
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML catalog: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize catalog to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Caller-supplied preprocessing implementations, keyed by hook name.
#[derive(Default, Clone)]
pub struct PreprocessHooks {
    hooks: AHashMap<String, PreprocessFn>,
}

impl PreprocessHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, hook: PreprocessFn) {
        self.hooks.insert(name.into(), hook);
    }

    pub fn get(&self, name: &str) -> Option<&PreprocessFn> {
        self.hooks.get(name)
    }
}

/// An immutable, explicitly constructed model catalog.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: BTreeMap<String, ModelDefinition>,
}

/// On-disk catalog schema: a single `[models.<name>]` table per entry.
#[derive(Serialize, Deserialize)]
struct CatalogFile {
    models: BTreeMap<String, ModelDefinition>,
}

impl ModelRegistry {
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, ModelDefinition)>,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parses a catalog from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let catalog: CatalogFile = toml::from_str(text)?;
        Ok(Self {
            entries: catalog.models,
        })
    }

    /// Loads a catalog from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, RegistryError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Serialises the catalog back to TOML.
    pub fn to_toml_string(&self) -> Result<String, RegistryError> {
        Ok(toml::to_string_pretty(&CatalogFile {
            models: self.entries.clone(),
        })?)
    }

    pub fn get(&self, name: &str) -> Option<&ModelDefinition> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelDefinition)> {
        self.entries.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Constructs the evaluator for a named model, loading its
    /// coefficient table from `data_dir`. Models that name a
    /// preprocessing hook cannot be built this way; use `build_with`.
    pub fn build(
        &self,
        name: &str,
        data_dir: &Path,
    ) -> Result<Box<dyn MethylationModel>, RegistryError> {
        self.build_with(name, data_dir, &PreprocessHooks::default())
    }

    /// Constructs the evaluator for a named model, resolving any named
    /// preprocessing hook from `hooks`.
    pub fn build_with(
        &self,
        name: &str,
        data_dir: &Path,
        hooks: &PreprocessHooks,
    ) -> Result<Box<dyn MethylationModel>, RegistryError> {
        let definition = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))?;
        let path = data_dir.join(&definition.model.file);

        match definition.model.kind {
            EvaluatorKind::Linear => {
                let coefficients = LinearCoefficients::load(&path)?;
                let mut model =
                    LinearMethylationModel::new(coefficients, definition.model.transform)
                        .with_metadata(definition.metadata.clone());
                if let Some(hook_name) = &definition.model.preprocess {
                    let hook = hooks.get(hook_name).ok_or_else(|| {
                        RegistryError::UnknownPreprocessor {
                            model: name.to_string(),
                            hook: hook_name.clone(),
                        }
                    })?;
                    model = model.with_preprocess(hook.clone());
                }
                log::info!("constructed linear evaluator for '{name}'");
                Ok(Box::new(model))
            }
            EvaluatorKind::SexEstimation => {
                if definition.model.preprocess.is_some() {
                    return Err(RegistryError::PreprocessUnsupported {
                        model: name.to_string(),
                    });
                }
                let reference = SexReference::load(&path)?;
                log::info!("constructed sex-estimation evaluator for '{name}'");
                Ok(Box::new(
                    SexEstimationModel::new(reference).with_metadata(definition.metadata.clone()),
                ))
            }
            EvaluatorKind::NotImplemented => {
                Err(RegistryError::NotImplemented(name.to_string()))
            }
        }
    }

    /// The catalog of published models this crate ships.
    pub fn bundled() -> Self {
        let mut entries = BTreeMap::new();
        let mut add = |name: &str,
                       metadata: ModelMetadata,
                       kind: EvaluatorKind,
                       file: &str,
                       transform: ScoreTransform,
                       preprocess: Option<&str>| {
            entries.insert(
                name.to_string(),
                ModelDefinition {
                    metadata,
                    model: ModelSpec {
                        kind,
                        file: file.to_string(),
                        transform,
                        preprocess: preprocess.map(str::to_string),
                    },
                },
            );
        };

        use EvaluatorKind::{Linear, NotImplemented, SexEstimation};
        use ScoreTransform::{Identity, Offset};

        add(
            "Horvathv1",
            meta(2013, "Multi-tissue", "Age (Years)",
                 "https://genomebiology.biomedcentral.com/articles/10.1186/gb-2013-14-10-r115"),
            Linear, "Horvath1.csv", ScoreTransform::anti_log_age(0.696), None,
        );
        add(
            "Hannum",
            meta(2013, "Blood", "Age (Years)",
                 "https://www.sciencedirect.com/science/article/pii/S1097276512008933"),
            Linear, "Hannum.csv", Identity, None,
        );
        add(
            "Lin",
            meta(2016, "Blood", "Age (Years)",
                 "https://www.aging-us.com/article/100908/text"),
            Linear, "Lin.csv", Offset(12.2169841), None,
        );
        add(
            "PhenoAge",
            meta(2018, "Blood", "Age (Years)",
                 "https://www.aging-us.com/article/101414/text"),
            Linear, "PhenoAge.csv", Offset(60.664), None,
        );
        add(
            "Horvathv2",
            meta(2018, "Skin + blood", "Age (Years)",
                 "https://www.aging-us.com/article/101508/text"),
            Linear, "Horvath2.csv", ScoreTransform::anti_log_age(-0.447119319), None,
        );
        add(
            "PEDBE",
            meta(2019, "Buccal", "Age (Years)",
                 "https://www.pnas.org/doi/10.1073/pnas.1820843116"),
            Linear, "PEDBE.csv", ScoreTransform::anti_log_age(-2.1), None,
        );
        add(
            "Zhang_10",
            meta(2019, "Blood", "Mortality Risk",
                 "https://www.nature.com/articles/ncomms14617"),
            Linear, "Zhang_10.csv", Identity, None,
        );
        add(
            "DunedinPoAm38",
            meta(2020, "Blood", "Aging Rate (Years/Year)",
                 "https://elifesciences.org/articles/54870#s2"),
            Linear, "DunedinPoAm38.csv", Offset(-0.06929805), None,
        );
        add(
            "DunedinPACE",
            meta(2022, "Blood", "Aging Rate (Years/Year)",
                 "https://www.proquest.com/docview/2634411178"),
            Linear, "DunedinPACE.csv", Offset(-1.949859), Some(PACE_NORMALIZATION_HOOK),
        );
        add(
            "GrimAgeV1",
            meta(2019, "Blood", "Mortality Adjusted Age (Years)",
                 "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6366976/"),
            NotImplemented, "GrimAgeV1.csv", Identity, None,
        );
        add(
            "GrimAgeV2",
            meta(2022, "Blood", "Mortality Adjusted Age (Years)",
                 "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC9792204/"),
            NotImplemented, "GrimAgeV2.csv", Identity, None,
        );
        add(
            "AlcoholMcCartney",
            meta(2018, "Blood", "Alcohol Consumption",
                 "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6158884/"),
            Linear, "Alcohol.csv", Identity, None,
        );
        add(
            "BMI_McCartney",
            meta(2018, "Blood", "BMI",
                 "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6158884/"),
            Linear, "BMI.csv", Identity, None,
        );
        add(
            "DNAmTL",
            meta(2019, "Blood, Adipose", "Telomere Length",
                 "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6738410/"),
            Linear, "DNAmTL.csv", Offset(-7.924780053), None,
        );
        add(
            "HRSInCHPhenoAge",
            meta(2022, "Blood", "Age (Years)",
                 "https://www.nature.com/articles/s43587-022-00248-2"),
            Linear, "HRSInCHPhenoAge.csv", Offset(52.8334080), None,
        );
        add(
            "Knight",
            meta(2016, "Cord Blood", "Gestational Age",
                 "https://genomebiology.biomedcentral.com/articles/10.1186/s13059-016-1068-z"),
            Linear, "Knight.csv", Offset(41.7), None,
        );
        add(
            "LeeControl",
            meta(2019, "Placenta", "Gestational Age",
                 "https://www.aging-us.com/article/102049/text"),
            Linear, "LeeControl.csv", Offset(13.06182), None,
        );
        add(
            "LeeRefinedRobust",
            meta(2019, "Placenta", "Gestational Age",
                 "https://www.aging-us.com/article/102049/text"),
            Linear, "LeeRefinedRobust.csv", Offset(30.74966), None,
        );
        add(
            "LeeRobust",
            meta(2019, "Placenta", "Gestational Age",
                 "https://www.aging-us.com/article/102049/text"),
            Linear, "LeeRobust.csv", Offset(24.99772), None,
        );
        add(
            "SmokingMcCartney",
            meta(2018, "Blood", "Smoking Status",
                 "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6158884/"),
            Linear, "Smoking.csv", Identity, None,
        );
        add(
            "SexEstimation",
            meta(2021, "Blood", "Sex",
                 "https://bmcgenomics.biomedcentral.com/articles/10.1186/s12864-021-07675-2"),
            SexEstimation, "estimateSex.csv", Identity, None,
        );
        add(
            "Bohlin",
            meta_bare(2016, "Cord Blood", "Gestational Age"),
            Linear, "Bohlin.csv", Offset(277.2421), None,
        );
        add(
            "DNAmClockCortical",
            meta_bare(2020, "Brain", "Age (Years)"),
            Linear, "DNAmClockCortical.csv", Offset(0.577682570446177), None,
        );
        add(
            "Mayne",
            meta_bare(2017, "Placenta", "Gestational Age"),
            Linear, "Mayne.csv", Offset(24.99026), None,
        );
        add(
            "MiAge",
            meta_bare(2018, "Multi-tissue", "Mitotic Age"),
            Linear, "MiAge.csv", Identity, None,
        );
        add(
            "VidalBralo",
            meta_bare(2016, "Blood", "Age (Years)"),
            Linear, "VidalBralo.csv", Offset(84.7), None,
        );
        add(
            "Zhang2019",
            meta_bare(2019, "Blood", "Age (Years)"),
            Linear, "Zhang2019.csv", Offset(65.8), None,
        );

        Self { entries }
    }
}

/// The hook name pace-of-aging models use for their gold-standard
/// normalization, implemented by an external collaborator.
pub const PACE_NORMALIZATION_HOOK: &str = "pace-normalization";

fn meta(year: u16, tissue: &str, output: &str, source: &str) -> ModelMetadata {
    ModelMetadata {
        year: Some(year),
        species: Some("Human".to_string()),
        tissue: Some(tissue.to_string()),
        source: Some(source.to_string()),
        output: Some(output.to_string()),
    }
}

fn meta_bare(year: u16, tissue: &str, output: &str) -> ModelMetadata {
    ModelMetadata {
        year: Some(year),
        species: Some("Human".to_string()),
        tissue: Some(tissue.to_string()),
        source: None,
        output: Some(output.to_string()),
    }
}
