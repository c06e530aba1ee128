use crate::error::{AppError, AppResult};
use crate::models::{
    AddHoldingRequest, Holding, HoldingView, Portfolio, PortfolioRequest, PortfolioSummary,
    PortfolioView, Stock, UpdateHoldingRequest, DEFAULT_CURRENCY,
};
use crate::services::currency::CurrencySource;
use crate::services::valuation::{aggregate, merge_purchase, value_position, Position, Purchase, Valuation};
use crate::storage::Store;
use crate::utils::normalize_symbol;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PortfolioService {
    store: Arc<dyn Store>,
    currency: Arc<dyn CurrencySource>,
}

/// The currency a user sees amounts in, with the USD rate into it.
struct Display {
    currency: String,
    rate: Decimal,
}

impl Display {
    fn convert(&self, usd: Decimal) -> AppResult<Decimal> {
        usd.checked_mul(self.rate).ok_or_else(|| {
            AppError::InvalidInput(format!("Amount is out of range in {}", self.currency))
        })
    }
}

fn validate_name(request: &PortfolioRequest) -> AppResult<(&str, Option<&str>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Portfolio name is required".to_string()));
    }
    let description = request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    Ok((name, description))
}

impl PortfolioService {
    pub fn new(store: Arc<dyn Store>, currency: Arc<dyn CurrencySource>) -> Self {
        Self { store, currency }
    }

    /// The portfolio, if it exists and belongs to `user_id`.
    async fn owned_portfolio(&self, user_id: i64, portfolio_id: i64) -> AppResult<Portfolio> {
        match self.store.find_portfolio(portfolio_id).await? {
            Some(p) if p.user_id == user_id => Ok(p),
            _ => Err(AppError::not_found("Portfolio", portfolio_id)),
        }
    }

    /// The holding, which must sit in `portfolio`.
    async fn owned_holding(&self, portfolio: &Portfolio, holding_id: i64) -> AppResult<Holding> {
        let holding = self
            .store
            .find_holding(holding_id)
            .await?
            .ok_or_else(|| AppError::not_found("Stock holding", holding_id))?;
        if holding.portfolio_id != portfolio.id {
            warn!(
                "User {} referenced holding {} outside portfolio {}",
                portfolio.user_id, holding_id, portfolio.id
            );
            return Err(AppError::Ownership(
                "Stock holding does not belong to this user or portfolio".to_string(),
            ));
        }
        Ok(holding)
    }

    async fn display_for(&self, user_id: i64) -> AppResult<Display> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))?;
        let rate = self
            .currency
            .rate(DEFAULT_CURRENCY, &user.preferred_currency)
            .await?;
        Ok(Display {
            currency: user.preferred_currency,
            rate,
        })
    }

    fn holding_view(holding: Holding, stock: Option<Stock>, v: &Valuation, display: &Display) -> AppResult<HoldingView> {
        let (name, current_price) = match stock {
            Some(s) => (s.name, s.current_price),
            None => (holding.stock_symbol.clone(), Decimal::ZERO),
        };
        Ok(HoldingView {
            id: holding.id,
            symbol: holding.stock_symbol,
            name,
            quantity: holding.quantity,
            purchase_price: display.convert(holding.average_purchase_price)?,
            current_price: display.convert(current_price)?,
            current_value: display.convert(v.current_value)?,
            profit_loss: display.convert(v.profit_loss)?,
            profit_loss_percentage: v.profit_loss_percentage,
            purchase_date: holding.purchase_date,
            currency: display.currency.clone(),
        })
    }

    /// Values `holdings` at current prices and converts every amount for
    /// display. Fails if any figure does not fit a `Decimal`.
    async fn render(&self, portfolio: Portfolio, holdings: Vec<Holding>, display: &Display) -> AppResult<PortfolioView> {
        let mut symbols: Vec<String> = holdings.iter().map(|h| h.stock_symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        let stocks: HashMap<String, Stock> = self
            .store
            .find_stocks(&symbols)
            .await?
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();

        let mut valuations = Vec::with_capacity(holdings.len());
        let mut views = Vec::with_capacity(holdings.len());
        for h in holdings {
            let stock = stocks.get(&h.stock_symbol).cloned();
            let price = match &stock {
                Some(s) => s.current_price,
                None => {
                    warn!("No price for {}; valuing holding {} at zero", h.stock_symbol, h.id);
                    Decimal::ZERO
                }
            };
            let valuation = value_position(h.quantity, h.average_purchase_price, price)?;
            views.push(Self::holding_view(h, stock, &valuation, display)?);
            valuations.push(valuation);
        }
        let totals = aggregate(&valuations)?;

        Ok(PortfolioView {
            id: portfolio.id,
            name: portfolio.name,
            description: portfolio.description,
            holdings: views,
            total_value: display.convert(totals.total_value)?,
            total_cost: display.convert(totals.total_cost)?,
            total_profit_loss: display.convert(totals.total_profit_loss)?,
            total_profit_loss_percentage: totals.total_profit_loss_percentage,
            currency: display.currency.clone(),
        })
    }

    pub async fn summaries(&self, user_id: i64) -> AppResult<Vec<PortfolioSummary>> {
        let display = self.display_for(user_id).await?;
        let mut summaries = Vec::new();
        for portfolio in self.store.list_portfolios(user_id).await? {
            let holdings = self.store.list_holdings(portfolio.id).await?;
            let view = self.render(portfolio, holdings, &display).await?;
            summaries.push(PortfolioSummary {
                id: view.id,
                name: view.name,
                description: view.description,
                stock_count: view.holdings.len(),
                total_value: view.total_value,
                total_profit_loss: view.total_profit_loss,
                total_profit_loss_percentage: view.total_profit_loss_percentage,
                currency: view.currency,
            });
        }
        Ok(summaries)
    }

    pub async fn get(&self, user_id: i64, portfolio_id: i64) -> AppResult<PortfolioView> {
        let portfolio = self.owned_portfolio(user_id, portfolio_id).await?;
        let display = self.display_for(user_id).await?;
        let holdings = self.store.list_holdings(portfolio.id).await?;
        self.render(portfolio, holdings, &display).await
    }

    pub async fn create(&self, user_id: i64, request: PortfolioRequest) -> AppResult<Portfolio> {
        let (name, description) = validate_name(&request)?;
        let portfolio = self.store.create_portfolio(user_id, name, description).await?;
        info!("User {} created portfolio {}", user_id, portfolio.id);
        Ok(portfolio)
    }

    pub async fn update(&self, user_id: i64, portfolio_id: i64, request: PortfolioRequest) -> AppResult<Portfolio> {
        let (name, description) = validate_name(&request)?;
        self.owned_portfolio(user_id, portfolio_id).await?;
        self.store
            .update_portfolio(portfolio_id, name, description)
            .await?
            .ok_or_else(|| AppError::not_found("Portfolio", portfolio_id))
    }

    pub async fn delete(&self, user_id: i64, portfolio_id: i64) -> AppResult<()> {
        self.owned_portfolio(user_id, portfolio_id).await?;
        if !self.store.delete_portfolio(portfolio_id).await? {
            return Err(AppError::not_found("Portfolio", portfolio_id));
        }
        info!("User {} deleted portfolio {}", user_id, portfolio_id);
        Ok(())
    }

    /// Renders the portfolio with `symbol` held at `quantity` and `average_price`
    /// in place of its current holding, so a write that would leave the
    /// portfolio unreadable is refused before it reaches the store.
    async fn check_renderable(
        &self,
        portfolio: &Portfolio,
        symbol: &str,
        quantity: Decimal,
        average_price: Decimal,
        display: &Display,
    ) -> AppResult<()> {
        let mut holdings = self.store.list_holdings(portfolio.id).await?;
        match holdings.iter_mut().find(|h| h.stock_symbol == symbol) {
            Some(h) => {
                h.quantity = quantity;
                h.average_purchase_price = average_price;
            }
            None => holdings.push(Holding {
                id: 0,
                portfolio_id: portfolio.id,
                stock_symbol: symbol.to_string(),
                quantity,
                average_purchase_price: average_price,
                purchase_date: Utc::now(),
            }),
        }
        self.render(portfolio.clone(), holdings, display).await.map(|_| ())
    }

    /// Buys into the portfolio: merges with an existing holding of the same
    /// stock or opens a new one.
    pub async fn add_holding(&self, user_id: i64, portfolio_id: i64, request: AddHoldingRequest) -> AppResult<HoldingView> {
        let purchase = Purchase::new(request.quantity, request.purchase_price)?;
        let portfolio = self.owned_portfolio(user_id, portfolio_id).await?;
        let symbol = normalize_symbol(&request.symbol);
        if self.store.find_stock(&symbol).await?.is_none() {
            return Err(AppError::NotFound(format!("Stock not found with symbol: {symbol}")));
        }

        let display = self.display_for(user_id).await?;
        let now = Utc::now();
        let held = self
            .store
            .list_holdings(portfolio.id)
            .await?
            .into_iter()
            .find(|h| h.stock_symbol == symbol)
            .map(|h| Position {
                quantity: h.quantity,
                average_price: h.average_purchase_price,
                acquired_at: h.purchase_date,
            });
        let projected = merge_purchase(held, purchase, now)?;
        self.check_renderable(&portfolio, &symbol, projected.quantity, projected.average_price, &display)
            .await?;

        let holding = self
            .store
            .record_purchase(portfolio.id, &symbol, purchase, now)
            .await?;
        info!(
            "Portfolio {}: bought {} {} @ {} -> {} @ {}",
            portfolio.id,
            purchase.quantity,
            symbol,
            purchase.price,
            holding.quantity,
            holding.average_purchase_price
        );
        self.view_one(holding, &display).await
    }

    /// Replaces quantity and average price outright; no merging.
    pub async fn update_holding(
        &self,
        user_id: i64,
        portfolio_id: i64,
        holding_id: i64,
        request: UpdateHoldingRequest,
    ) -> AppResult<HoldingView> {
        let replacement = Purchase::new(request.quantity, request.purchase_price)?;
        let portfolio = self.owned_portfolio(user_id, portfolio_id).await?;
        let holding = self.owned_holding(&portfolio, holding_id).await?;

        let display = self.display_for(user_id).await?;
        self.check_renderable(
            &portfolio,
            &holding.stock_symbol,
            replacement.quantity,
            replacement.price,
            &display,
        )
        .await?;

        let updated = self
            .store
            .overwrite_holding(holding.id, replacement.quantity, replacement.price)
            .await?
            .ok_or_else(|| AppError::not_found("Stock holding", holding_id))?;
        self.view_one(updated, &display).await
    }

    pub async fn remove_holding(&self, user_id: i64, portfolio_id: i64, holding_id: i64) -> AppResult<()> {
        let portfolio = self.owned_portfolio(user_id, portfolio_id).await?;
        let holding = self.owned_holding(&portfolio, holding_id).await?;
        if !self.store.delete_holding(holding.id).await? {
            return Err(AppError::not_found("Stock holding", holding_id));
        }
        info!("Portfolio {}: removed holding {} ({})", portfolio.id, holding.id, holding.stock_symbol);
        Ok(())
    }

    async fn view_one(&self, holding: Holding, display: &Display) -> AppResult<HoldingView> {
        let stock = self.store.find_stock(&holding.stock_symbol).await?;
        let price = stock.as_ref().map_or(Decimal::ZERO, |s| s.current_price);
        let valuation = value_position(holding.quantity, holding.average_purchase_price, price)?;
        Self::holding_view(holding, stock, &valuation, display)
    }
}
