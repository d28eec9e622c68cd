//! Sort-mode resolution and one-shot sort selection on the render surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::progress::ProgressEventKind;
use crate::surface::RenderSurface;

/// Logical review ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Newest,
    Highest,
    Lowest,
    #[default]
    Relevance,
}

impl SortMode {
    pub const ALL: [SortMode; 4] = [Self::Newest, Self::Highest, Self::Lowest, Self::Relevance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Highest => "highest",
            Self::Lowest => "lowest",
            Self::Relevance => "relevance",
        }
    }

    /// Localized labels of the menu entry for this mode.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Newest => NEWEST_KEYWORDS,
            Self::Highest => HIGHEST_KEYWORDS,
            Self::Lowest => LOWEST_KEYWORDS,
            Self::Relevance => RELEVANCE_KEYWORDS,
        }
    }

    /// Whether a control label names this mode in any known locale.
    pub fn matches_label(&self, label: &str) -> bool {
        self.keywords().iter().any(|keyword| label.contains(keyword))
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "highest" => Ok(Self::Highest),
            "lowest" => Ok(Self::Lowest),
            "relevance" => Ok(Self::Relevance),
            other => Err(format!(
                "unknown sort mode '{other}' (expected newest, highest, lowest or relevance)"
            )),
        }
    }
}

/// Keyword list for a free-form mode name; unknown names get the relevance list.
pub fn keywords_for(mode: &str) -> &'static [&'static str] {
    mode.parse::<SortMode>()
        .unwrap_or(SortMode::Relevance)
        .keywords()
}

const NEWEST_KEYWORDS: &[&str] = &[
    "Newest",
    "החדשות ביותר",
    "ใหม่ที่สุด",
    "最新",
    "Más recientes",
    "Mais recentes",
    "Neueste",
    "Plus récent",
    "Più recenti",
    "Nyeste",
    "Новые",
    "Nieuwste",
    "جديد",
    "Uusimmat",
    "Najnowsze",
    "Senaste",
];

const HIGHEST_KEYWORDS: &[&str] = &[
    "Highest rating",
    "הדירוג הגבוה ביותר",
    "คะแนนสูงสุด",
    "最高評価",
    "Calificación más alta",
    "Melhor avaliação",
    "Höchste Bewertung",
    "Note la plus élevée",
    "Valutazione più alta",
    "Høyeste vurdering",
    "Наивысший рейтинг",
    "Hoogste waardering",
    "أعلى تقييم",
];

const LOWEST_KEYWORDS: &[&str] = &[
    "Lowest rating",
    "הדירוג הנמוך ביותר",
    "คะแนนต่ำสุด",
    "最低評価",
    "Calificación más baja",
    "Pior avaliação",
    "Niedrigste Bewertung",
    "Note la plus basse",
    "Valutazione più bassa",
    "Laveste vurdering",
    "Наименьший рейтинг",
    "Laagste waardering",
    "أقل تقييم",
];

const RELEVANCE_KEYWORDS: &[&str] = &[
    "Most relevant",
    "רלוונטיות ביותר",
    "เกี่ยวข้องมากที่สุด",
    "関連性",
    "Más relevantes",
    "Mais relevantes",
    "Relevanteste",
    "Plus pertinents",
    "Più pertinenti",
    "Mest relevante",
];

/// What happened when selecting a sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SortSelection {
    /// Relevance is the page default; nothing to do.
    Skipped,
    Selected,
    /// No control matched any keyword.
    NotFound,
    /// The surface failed while looking for the control.
    Failed { reason: String },
}

impl SortSelection {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Skipped | Self::Selected)
    }
}

/// Select `mode` on the surface. Never fails the run: a miss is reported and
/// loading continues in whatever order is already active.
pub async fn select_sort<S>(surface: &mut S, mode: SortMode, ctx: &RunContext) -> SortSelection
where
    S: RenderSurface + ?Sized,
{
    if mode == SortMode::Relevance {
        return SortSelection::Skipped;
    }

    let predicate = move |label: &str| mode.matches_label(label);
    match surface.locate_and_activate(&predicate).await {
        Ok(true) => {
            info!(%mode, "sort order selected");
            ctx.emit(ProgressEventKind::SortSelected {
                mode: mode.to_string(),
            });
            SortSelection::Selected
        }
        Ok(false) => {
            warn!(%mode, "no sort control matched");
            ctx.emit(ProgressEventKind::SortNotFound {
                mode: mode.to_string(),
            });
            SortSelection::NotFound
        }
        Err(e) => {
            warn!(%mode, error = %e, "sort selection failed");
            ctx.emit(ProgressEventKind::Warning {
                message: format!("failed to set sort order: {e}"),
            });
            SortSelection::Failed {
                reason: e.to_string(),
            }
        }
    }
}
