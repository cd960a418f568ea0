use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::report::Element;

/// Script id to the lines it printed, in the order nmap reported them.
pub type ScriptOutputs = IndexMap<String, Vec<String>>;

/// Address family of a scanned host, as reported by `<address addrtype=...>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ipv4,
    Ipv6,
    Mac,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ipv4 => "ipv4",
            Network::Ipv6 => "ipv6",
            Network::Mac => "mac",
        }
    }
}

impl FromStr for Network {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(Network::Ipv4),
            "ipv6" => Ok(Network::Ipv6),
            "mac" => Ok(Network::Mac),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport protocol of a scanned port, as reported by `<port protocol=...>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
    Sctp,
    Ip,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
            Transport::Sctp => "sctp",
            Transport::Ip => "ip",
        }
    }
}

impl FromStr for Transport {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            "sctp" => Ok(Transport::Sctp),
            "ip" => Ok(Transport::Ip),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record field as it appears in tabular output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    field: &'static str,
    display: Option<&'static str>,
}

impl Column {
    const fn new(field: &'static str) -> Self {
        Self { field, display: None }
    }

    const fn renamed(field: &'static str, display: &'static str) -> Self {
        Self {
            field,
            display: Some(display),
        }
    }

    pub fn name(&self) -> &'static str {
        self.display.unwrap_or(self.field)
    }
}

pub const HOST_COLUMNS: [Column; 4] = [
    Column::new("network"),
    Column::new("address"),
    Column::new("osvendor"),
    Column::new("osfamily"),
];

pub const PORT_COLUMNS: [Column; 6] = [
    Column::new("transport"),
    Column::renamed("number", "port"),
    Column::new("application"),
    Column::new("product"),
    Column::new("version"),
    Column::new("extra"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub reachable: bool,
    pub transport: Transport,
    pub number: u16,
    pub application: String,
    pub product: String,
    pub version: String,
    pub extra: String,
    #[serde(flatten)]
    pub scripts: ScriptOutputs,
}

impl Port {
    /// Build a port record from one `<port>` element.
    pub fn from_element(element: &Element) -> Result<Self, ReportError> {
        let state = element.required("state")?.required_attr("state")?;
        let number = parse_attr(element, "portid")?;
        let transport = parse_attr(element, "protocol")?;

        let service = element.find("service");
        let application = match service {
            Some(service) => normalize_service_name(service.required_attr("name")?).to_string(),
            None => String::new(),
        };
        let service_attr = |key: &str| {
            service
                .and_then(|service| service.attr(key))
                .unwrap_or_default()
                .to_string()
        };

        let mut scripts = ScriptOutputs::new();
        for script in element.descendants("script") {
            let id = script.required_attr("id")?;
            let output = script.required_attr("output")?;
            scripts.insert(id.to_string(), normalize_script_output(output));
        }

        Ok(Self {
            reachable: state == "open",
            transport,
            number,
            application,
            product: service_attr("product"),
            version: service_attr("version"),
            extra: service_attr("extrainfo"),
            scripts,
        })
    }

    pub fn fixed_row(&self) -> Vec<String> {
        vec![
            self.transport.to_string(),
            self.number.to_string(),
            self.application.clone(),
            self.product.clone(),
            self.version.clone(),
            self.extra.clone(),
        ]
    }

    /// Fixed column values followed by one value per script, in script order.
    pub fn row(&self) -> Vec<String> {
        let mut row = self.fixed_row();
        row.extend(self.scripts.values().map(|lines| lines.join("\n")));
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub reachable: bool,
    pub network: Network,
    pub address: String,
    #[serde(rename = "osvendor")]
    pub os_vendor: String,
    #[serde(rename = "osfamily")]
    pub os_family: String,
    pub ports: BTreeMap<u16, Port>,
}

impl Host {
    /// Build a host record from one complete `<host>` element.
    ///
    /// Closed and filtered ports are dropped here and never reach a sink.
    pub fn from_element(element: &Element) -> Result<Self, ReportError> {
        let address = element.required("address")?;
        let status = element.required("status")?;

        let (os_vendor, os_family) = match element.find("os") {
            Some(os) => match least_accurate_class(os) {
                Some(class) => (
                    class.attr("vendor").unwrap_or_default().to_string(),
                    class.attr("osfamily").unwrap_or_default().to_string(),
                ),
                None => (String::new(), String::new()),
            },
            None => (String::new(), String::new()),
        };

        let mut ports = BTreeMap::new();
        for port in element.required("ports")?.descendants("port") {
            let port = Port::from_element(port)?;
            if port.reachable {
                ports.insert(port.number, port);
            }
        }

        let state = status.required_attr("state")?;
        let reason = status.attr("reason").unwrap_or_default();
        let reachable = !ports.is_empty() || (state == "up" && reason != "user-set");

        Ok(Self {
            reachable,
            network: parse_attr(address, "addrtype")?,
            address: address.required_attr("addr")?.to_string(),
            os_vendor,
            os_family,
            ports,
        })
    }

    pub fn fixed_row(&self) -> Vec<String> {
        vec![
            self.network.to_string(),
            self.address.clone(),
            self.os_vendor.clone(),
            self.os_family.clone(),
        ]
    }

    /// Fixed column names for this host's rows, or empty when it has no ports.
    ///
    /// Script columns vary per port and are left to the caller.
    pub fn header(&self) -> Vec<String> {
        if self.ports.is_empty() {
            return Vec::new();
        }
        HOST_COLUMNS
            .iter()
            .chain(PORT_COLUMNS.iter())
            .map(|column| column.name().to_string())
            .collect()
    }

    /// One row per port, host fields repeated, ascending port order.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.ports
            .values()
            .map(|port| {
                let mut row = self.fixed_row();
                row.extend(port.row());
                row
            })
            .collect()
    }
}

/// Picks the OS class with the lowest accuracy among nmap's guesses.
///
/// Ties keep the first class in document order.
fn least_accurate_class(os: &Element) -> Option<&Element> {
    os.descendants("osclass").min_by_key(|class| {
        class
            .attr("accuracy")
            .and_then(|accuracy| accuracy.parse::<u32>().ok())
            .unwrap_or(u32::MAX)
    })
}

fn parse_attr<T: FromStr>(element: &Element, key: &'static str) -> Result<T, ReportError> {
    let value = element.required_attr(key)?;
    value.parse().map_err(|_| ReportError::InvalidAttribute {
        attribute: key,
        element: element.name().to_string(),
        value: value.to_string(),
    })
}

pub fn normalize_service_name(name: &str) -> &str {
    match name {
        "http-alt" | "https-alt" => name.trim_end_matches("-alt"),
        _ => name,
    }
}

/// Dedent script output and drop blank lines among the first two.
pub fn normalize_script_output(output: &str) -> Vec<String> {
    let lines: Vec<&str> = output.lines().collect();
    let margin = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                line.get(margin..).unwrap_or(line.trim_start()).to_string()
            }
        })
        .enumerate()
        .filter(|(index, line)| *index > 1 || !line.is_empty())
        .map(|(_, line)| line)
        .collect()
}
