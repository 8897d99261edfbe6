//! The IRR adapter: a `reqwest` client against an IRRD GraphQL-like query
//! endpoint. This crate is the server side of the shape the
//! `Akaere-NetWorks-whois-server` example is a client of; the response
//! structs here mirror that file's `serde::Deserialize` conventions
//! (`camelCase` field renames) even though here they describe IRRD's raw
//! route-object output rather than a fully collated summary.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{with_retries, AutnumRef, IrrSource, MemberOfRaw, SetMember, SourceAdapter};
use crate::error::Error;
use crate::model::{DataSource, IpNetwork, LastUpdate, RouteInfo, RpkiStatus};

pub struct IrrAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl IrrAdapter {
    pub fn new(endpoint: impl Into<String>) -> IrrAdapter {
        IrrAdapter {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: endpoint.into(),
        }
    }

    async fn post_query(&self, query: serde_json::Value) -> Result<serde_json::Value, Error> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&query)
            .send()
            .await
            .map_err(|e| Error::Other(e.into()))?;

        if !resp.status().is_success() {
            return Err(Error::SourceUnavailable(DataSource::Irr));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| Error::Other(e.into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    prefix: String,
    asn: u32,
    rpsl_pk: Option<String>,
    source: Option<String>,
    rpki_status: Option<String>,
    rpki_max_length: Option<u8>,
    rpsl_text: Option<String>,
}

impl RawRoute {
    fn into_route_info(self) -> Option<RouteInfo> {
        let prefix: IpNetwork = self.prefix.parse().ok()?;
        let rpki_status = self.rpki_status.as_deref().map(|s| match s {
            "valid" => RpkiStatus::Valid,
            "invalid" => RpkiStatus::Invalid,
            _ => RpkiStatus::Unknown,
        });
        Some(RouteInfo {
            source: DataSource::Irr,
            prefix,
            asn: Some(self.asn),
            irr_source: self.source,
            rpsl_pk: self.rpsl_pk,
            rpki_status,
            rpki_max_length: self.rpki_max_length,
            rpsl_text: self.rpsl_text,
        })
    }
}

#[async_trait]
impl SourceAdapter for IrrAdapter {
    fn source(&self) -> DataSource {
        DataSource::Irr
    }

    async fn query_prefixes(&self, prefixes: &[IpNetwork]) -> Result<Vec<RouteInfo>, Error> {
        let prefix_strs: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        with_retries(DataSource::Irr, || async {
            let body = json!({
                "query": "query RoutesByPrefixAny($prefixes: [String!]!) { routesByPrefixAny(prefixes: $prefixes) { prefix asn rpslPk source rpkiStatus rpkiMaxLength rpslText } }",
                "variables": { "prefixes": &prefix_strs },
            });
            let value = self.post_query(body).await?;
            parse_routes(&value, "routesByPrefixAny")
        })
        .await
    }

    async fn query_asn(&self, asn: u32) -> Result<Vec<RouteInfo>, Error> {
        with_retries(DataSource::Irr, || async {
            let body = json!({
                "query": "query RoutesByAsn($asn: Int!) { routesByAsn(asn: $asn) { prefix asn rpslPk source rpkiStatus rpkiMaxLength rpslText } }",
                "variables": { "asn": asn },
            });
            let value = self.post_query(body).await?;
            parse_routes(&value, "routesByAsn")
        })
        .await
    }
}

fn parse_routes(value: &serde_json::Value, field: &str) -> Result<Vec<RouteInfo>, Error> {
    let raw = value
        .pointer(&format!("/data/{field}"))
        .cloned()
        .unwrap_or(serde_json::Value::Array(vec![]));
    let routes: Vec<RawRoute> = serde_json::from_value(raw).map_err(|e| Error::Other(e.into()))?;
    Ok(routes.into_iter().filter_map(RawRoute::into_route_info).collect())
}

#[async_trait]
impl IrrSource for IrrAdapter {
    async fn query_set_members(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, Vec<SetMember>>, Error> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        with_retries(DataSource::Irr, || async {
            let body = json!({
                "query": "query SetMembers($names: [String!]!) { setMembers(names: $names) { name members { name source } } }",
                "variables": { "names": names },
            });
            let value = self.post_query(body).await?;
            let raw = value
                .pointer("/data/setMembers")
                .cloned()
                .unwrap_or(serde_json::Value::Array(vec![]));
            #[derive(Deserialize)]
            struct RawMember {
                name: String,
                source: String,
            }
            #[derive(Deserialize)]
            struct RawSetMembers {
                name: String,
                members: Vec<RawMember>,
            }
            let entries: Vec<RawSetMembers> =
                serde_json::from_value(raw).map_err(|e| Error::Other(e.into()))?;

            Ok(entries
                .into_iter()
                .map(|entry| {
                    let members = entry
                        .members
                        .into_iter()
                        .map(|m| SetMember {
                            name: m.name,
                            source: m.source,
                        })
                        .collect();
                    (entry.name, members)
                })
                .collect())
        })
        .await
    }

    async fn query_member_of(&self, target: &str) -> Result<MemberOfRaw, Error> {
        with_retries(DataSource::Irr, || async {
            let body = json!({
                "query": "query MemberOf($target: String!) { memberOf(target: $target) { irr sets autnumRefs { setName mntBy mbrsByRef } } }",
                "variables": { "target": target },
            });
            let value = self.post_query(body).await?;
            let raw = value
                .pointer("/data/memberOf")
                .cloned()
                .unwrap_or(serde_json::Value::Array(vec![]));
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct RawAutnumRef {
                set_name: String,
                mnt_by: Vec<String>,
                mbrs_by_ref: Vec<String>,
            }
            #[derive(Deserialize)]
            struct RawEntry {
                irr: String,
                sets: Vec<String>,
                #[serde(default, rename = "autnumRefs")]
                autnum_refs: Vec<RawAutnumRef>,
            }
            let entries: Vec<RawEntry> =
                serde_json::from_value(raw).map_err(|e| Error::Other(e.into()))?;

            let mut result = MemberOfRaw::default();
            for entry in entries {
                result.sets_per_source.entry(entry.irr.clone()).or_default().extend(entry.sets);
                if !entry.autnum_refs.is_empty() {
                    result.autnum_refs_per_source.entry(entry.irr).or_default().extend(
                        entry.autnum_refs.into_iter().map(|r| AutnumRef {
                            set_name: r.set_name,
                            mnt_by: r.mnt_by,
                            mbrs_by_ref: r.mbrs_by_ref,
                        }),
                    );
                }
            }
            Ok(result)
        })
        .await
    }

    async fn query_last_update(&self) -> Result<LastUpdate, Error> {
        with_retries(DataSource::Irr, || async {
            let body = json!({
                "query": "query LastUpdate { lastUpdate { irr importer } }",
            });
            let value = self.post_query(body).await?;
            let raw = value.pointer("/data/lastUpdate").cloned().unwrap_or_default();
            serde_json::from_value(raw).map_err(|e| Error::Other(e.into()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_route_converts_unknown_rpki_status() {
        let raw = RawRoute {
            prefix: "192.0.2.0/24".to_string(),
            asn: 64500,
            rpsl_pk: None,
            source: Some("RIPE".to_string()),
            rpki_status: Some("bogus".to_string()),
            rpki_max_length: None,
            rpsl_text: None,
        };
        let info = raw.into_route_info().unwrap();
        assert_eq!(info.rpki_status, Some(RpkiStatus::Unknown));
    }

    #[test]
    fn raw_route_rejects_unparseable_prefix() {
        let raw = RawRoute {
            prefix: "not-a-prefix".to_string(),
            asn: 1,
            rpsl_pk: None,
            source: None,
            rpki_status: None,
            rpki_max_length: None,
            rpsl_text: None,
        };
        assert!(raw.into_route_info().is_none());
    }

    #[test]
    fn parse_routes_handles_missing_field() {
        let value = serde_json::json!({ "data": {} });
        let routes = parse_routes(&value, "routesByAsn").unwrap();
        assert!(routes.is_empty());
    }
}
