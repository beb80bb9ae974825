use chrono::Utc;
use domain::{format_usd, token_metadata_table, AssetItem, BalanceSnapshot};

/// Totals and ranks fetched assets, richest first.
///
/// Items whose USD value does not parse are left out of the total and sort
/// last; ties keep their fetch order.
pub fn aggregate(mut assets: Vec<AssetItem>) -> BalanceSnapshot {
    let total = assets
        .iter()
        .filter_map(AssetItem::usd_value)
        .fold(0.0, |acc, value| acc + value);
    assets.sort_by(|a, b| sort_key(b).total_cmp(&sort_key(a)));

    BalanceSnapshot {
        assets,
        total_usd_value: format_usd(total),
        token_metadata: token_metadata_table(),
        timestamp: Utc::now(),
    }
}

fn sort_key(asset: &AssetItem) -> f64 {
    asset.usd_value().unwrap_or(f64::NEG_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ChainId, ChainInfo, TokenType};

    fn asset(chain_id: u64, usd: &str) -> AssetItem {
        AssetItem {
            chain: ChainInfo {
                id: ChainId(chain_id),
                name: format!("chain-{chain_id}"),
                color: "blue".to_string(),
                icon: None,
            },
            symbol: "USDT".to_string(),
            token_type: TokenType::Usdt,
            balance: usd.to_string(),
            balance_usd: usd.to_string(),
            token_address: "0x0000000000000000000000000000000000000001".to_string(),
            token_image: "/tokens/usdt.png".to_string(),
        }
    }

    #[test]
    fn empty_input_totals_zero() {
        let snapshot = aggregate(vec![]);
        assert!(snapshot.assets.is_empty());
        assert_eq!(snapshot.total_usd_value, "0.00");
        assert_eq!(snapshot.token_metadata.len(), 2);
    }

    #[test]
    fn sorts_descending_and_sums() {
        let snapshot = aggregate(vec![
            asset(1, "10.50"),
            asset(56, "250.00"),
            asset(137, "0.01"),
            asset(10, "99.99"),
        ]);
        let values: Vec<f64> = snapshot
            .assets
            .iter()
            .map(|a| a.usd_value().unwrap())
            .collect();
        assert!(values.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(snapshot.assets[0].chain.id, ChainId(56));
        assert_eq!(snapshot.total_usd_value, "360.50");
    }

    #[test]
    fn ties_keep_fetch_order() {
        let snapshot = aggregate(vec![asset(1, "5.00"), asset(2, "5.00"), asset(3, "7.00")]);
        let order: Vec<u64> = snapshot.assets.iter().map(|a| a.chain.id.as_u64()).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn unparseable_values_are_skipped_in_total_and_sorted_last() {
        let snapshot = aggregate(vec![asset(1, "oops"), asset(2, "1.25")]);
        assert_eq!(snapshot.total_usd_value, "1.25");
        assert_eq!(snapshot.assets.last().unwrap().chain.id, ChainId(1));
    }
}
