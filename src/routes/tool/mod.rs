mod handler;

pub use handler::{
    create_asset,
    create_work_order,
    get_asset,
    get_inventory,
    get_user_status,
    get_work_order,
    issue_inventory,
    search_assets,
    search_inventory,
    search_users,
    search_work_orders,
    unlock_user_account,
    update_asset_status,
    update_work_order_status,
};
