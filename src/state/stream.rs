use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// The canonical streams kept per [`super::UseKey`] (`spec.md` §3).
///
/// Ordering matches the specification's table and doubles as the `Ord`
/// used by [`crate::sorted_vec_map::SortedVecMap`] storage — deterministic,
/// not alphabetical, so iteration order matches the spec's own listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
pub enum Stream {
    Domestic,
    Import,
    Export,
    Sales,
    Recycle,
    RecycleRecharge,
    Equipment,
    PriorEquipment,
    NewEquipment,
    RechargeEmissions,
    EolEmissions,
    Consumption,
}

impl Stream {
    /// `bank → equipment`, `priorBank → priorEquipment` (`spec.md` §4.2
    /// "Stream sugar").
    pub fn from_sugar(name: &str) -> Option<Stream> {
        match name {
            "bank" => Some(Stream::Equipment),
            "priorBank" => Some(Stream::PriorEquipment),
            "domestic" => Some(Stream::Domestic),
            "import" => Some(Stream::Import),
            "export" => Some(Stream::Export),
            "sales" => Some(Stream::Sales),
            "recycle" => Some(Stream::Recycle),
            "recycleRecharge" => Some(Stream::RecycleRecharge),
            "equipment" => Some(Stream::Equipment),
            "priorEquipment" => Some(Stream::PriorEquipment),
            "newEquipment" => Some(Stream::NewEquipment),
            "rechargeEmissions" => Some(Stream::RechargeEmissions),
            "eolEmissions" => Some(Stream::EolEmissions),
            "consumption" => Some(Stream::Consumption),
            _ => None,
        }
    }

    pub fn is_sales_intent(self) -> bool {
        matches!(self, Stream::Domestic | Stream::Import | Stream::Export | Stream::Sales)
    }

    pub fn is_virgin_sales(self) -> bool {
        matches!(self, Stream::Domestic | Stream::Import | Stream::Export)
    }

    pub fn is_mutable_by_user(self) -> bool {
        matches!(
            self,
            Stream::Domestic | Stream::Import | Stream::Export | Stream::PriorEquipment
        )
    }

    /// Subset of streams subject to the "enabled" gate (`spec.md` §3).
    pub fn is_gated_by_enable(self) -> bool {
        matches!(self, Stream::Domestic | Stream::Import | Stream::Export)
    }
}

/// The three streams that can be individually `enable`d and carry an
/// `initialCharge` (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
pub enum SalesStream {
    Domestic,
    Import,
    Export,
}

impl SalesStream {
    pub fn as_stream(self) -> Stream {
        match self {
            SalesStream::Domestic => Stream::Domestic,
            SalesStream::Import => Stream::Import,
            SalesStream::Export => Stream::Export,
        }
    }

    pub fn from_stream(stream: Stream) -> Option<SalesStream> {
        match stream {
            Stream::Domestic => Some(SalesStream::Domestic),
            Stream::Import => Some(SalesStream::Import),
            Stream::Export => Some(SalesStream::Export),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_sugar_maps_bank_and_prior_bank() {
        assert_eq!(Stream::from_sugar("bank"), Some(Stream::Equipment));
        assert_eq!(Stream::from_sugar("priorBank"), Some(Stream::PriorEquipment));
        assert_eq!(Stream::from_sugar("equipment"), Some(Stream::Equipment));
        assert_eq!(Stream::from_sugar("nonsense"), None);
    }

    #[test]
    fn only_virgin_sales_streams_are_gated_by_enable() {
        assert!(Stream::Domestic.is_gated_by_enable());
        assert!(Stream::Import.is_gated_by_enable());
        assert!(Stream::Export.is_gated_by_enable());
        assert!(!Stream::Sales.is_gated_by_enable());
        assert!(!Stream::Equipment.is_gated_by_enable());
        assert!(!Stream::Recycle.is_gated_by_enable());
    }

    #[test]
    fn sales_stream_round_trips_through_as_stream() {
        for s in [SalesStream::Domestic, SalesStream::Import, SalesStream::Export] {
            assert_eq!(SalesStream::from_stream(s.as_stream()), Some(s));
        }
        assert_eq!(SalesStream::from_stream(Stream::Equipment), None);
    }

    #[test]
    fn is_virgin_sales_excludes_the_sales_aggregate() {
        assert!(Stream::Domestic.is_virgin_sales());
        assert!(!Stream::Sales.is_virgin_sales());
    }
}
