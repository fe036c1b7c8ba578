use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A closed set of column keys for one kind of board.
///
/// Both the work-order board and the technician board run on the same
/// engine; the only thing that differs between them is the status enum
/// and the REST paths selected through [`StatusKey::KIND`].
pub trait StatusKey:
    Copy
    + Eq
    + Ord
    + Hash
    + Debug
    + Display
    + FromStr<Err = String>
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Every column of the board, in display order.
    const ALL: &'static [Self];

    /// Which board this status set belongs to.
    const KIND: BoardKind;

    fn as_str(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Draft,
    Pending,
    Assigned,
    InProgress,
    Review,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Pending => "Pending",
            Self::Assigned => "Assigned",
            Self::InProgress => "In Progress",
            Self::Review => "Review",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl StatusKey for WorkOrderStatus {
    const ALL: &'static [Self] = &[
        Self::Draft,
        Self::Pending,
        Self::Assigned,
        Self::InProgress,
        Self::Review,
        Self::Completed,
        Self::Cancelled,
    ];
    const KIND: BoardKind = BoardKind::WorkOrders;

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid work order status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicianStatus {
    Available,
    Assigned,
    EnRoute,
    OnSite,
    OnBreak,
    OffDuty,
}

impl StatusKey for TechnicianStatus {
    const ALL: &'static [Self] = &[
        Self::Available,
        Self::Assigned,
        Self::EnRoute,
        Self::OnSite,
        Self::OnBreak,
        Self::OffDuty,
    ];
    const KIND: BoardKind = BoardKind::Technicians;

    fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Assigned => "assigned",
            Self::EnRoute => "en_route",
            Self::OnSite => "on_site",
            Self::OnBreak => "on_break",
            Self::OffDuty => "off_duty",
        }
    }
}

impl Display for TechnicianStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TechnicianStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "assigned" => Ok(Self::Assigned),
            "en_route" => Ok(Self::EnRoute),
            "on_site" => Ok(Self::OnSite),
            "on_break" => Ok(Self::OnBreak),
            "off_duty" => Ok(Self::OffDuty),
            _ => Err(format!("Invalid technician status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Which board a session drives. Selects default REST paths, the push
/// subscription channel and the card markup class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardKind {
    #[default]
    WorkOrders,
    Technicians,
}

impl BoardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkOrders => "work-orders",
            Self::Technicians => "technicians",
        }
    }

    /// Path template for the status-update endpoint. `{id}` is replaced by
    /// the card id.
    pub fn default_status_path(&self) -> &'static str {
        match self {
            Self::WorkOrders => "/work-orders/{id}/status",
            Self::Technicians => "/technicians/{id}/status",
        }
    }

    pub fn default_snapshot_path(&self) -> &'static str {
        match self {
            Self::WorkOrders => "/dashboard/work-orders",
            Self::Technicians => "/dashboard/technicians",
        }
    }

    pub fn default_channel(&self) -> &'static str {
        match self {
            Self::WorkOrders => "work_orders",
            Self::Technicians => "technicians",
        }
    }

    /// CSS class carried by every rendered card of this board.
    pub fn card_class(&self) -> &'static str {
        match self {
            Self::WorkOrders => "work-order-card",
            Self::Technicians => "technician-card",
        }
    }
}

impl Display for BoardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work-orders" | "work_orders" => Ok(Self::WorkOrders),
            "technicians" => Ok(Self::Technicians),
            _ => Err(format!("Invalid board kind: {}", s)),
        }
    }
}
