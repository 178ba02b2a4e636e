use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const SEARCH_FIELD_MASK: &str =
    "places.id,places.displayName,places.formattedAddress,places.rating,places.location";
const DETAILS_FIELD_MASK: &str = "id,displayName,formattedAddress,rating,reviews";
const MAX_SEARCH_RESULTS: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A south-west / north-east rectangle used both to scope text searches and
/// to report the bounds-fit over a result set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub low: LatLng,
    pub high: LatLng,
}

impl Viewport {
    pub fn around(center: LatLng, span_degrees: f64) -> Self {
        let half = span_degrees.abs() / 2.0;
        Self {
            low: LatLng {
                lat: center.lat - half,
                lng: center.lng - half,
            },
            high: LatLng {
                lat: center.lat + half,
                lng: center.lng + half,
            },
        }
    }

    /// Tightest rectangle containing every point; `None` when empty.
    pub fn fit(points: impl IntoIterator<Item = LatLng>) -> Option<Self> {
        let mut bounds: Option<Viewport> = None;
        for point in points {
            bounds = Some(match bounds {
                None => Viewport {
                    low: point,
                    high: point,
                },
                Some(current) => Viewport {
                    low: LatLng {
                        lat: current.low.lat.min(point.lat),
                        lng: current.low.lng.min(point.lng),
                    },
                    high: LatLng {
                        lat: current.high.lat.max(point.lat),
                        lng: current.high.lng.max(point.lng),
                    },
                },
            });
        }
        bounds
    }

    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.low.lat + self.high.lat) / 2.0,
            lng: (self.low.lng + self.high.lng) / 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub rating: Option<f64>,
    pub location: LatLng,
}

#[derive(Debug, Clone)]
pub struct PlaceDetails {
    pub name: String,
    pub formatted_address: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Vec<String>,
}

#[async_trait]
pub trait PlaceDirectory: Send + Sync {
    async fn text_search(
        &self,
        query: &str,
        viewport: Option<&Viewport>,
    ) -> AppResult<Vec<PlaceSummary>>;

    async fn place_details(&self, place_id: &str) -> AppResult<PlaceDetails>;
}

#[derive(Clone)]
pub struct PlacesService {
    inner: Arc<dyn PlaceDirectory>,
}

impl PlacesService {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = HttpPlacesClient::new(config)?;
        Ok(Self {
            inner: Arc::new(client),
        })
    }

    #[cfg(test)]
    pub fn from_directory(directory: Arc<dyn PlaceDirectory>) -> Self {
        Self { inner: directory }
    }

    pub async fn text_search(
        &self,
        query: &str,
        viewport: Option<&Viewport>,
    ) -> AppResult<Vec<PlaceSummary>> {
        self.inner.text_search(query, viewport).await
    }

    pub async fn place_details(&self, place_id: &str) -> AppResult<PlaceDetails> {
        self.inner.place_details(place_id).await
    }
}

struct HttpPlacesClient {
    http: Client,
    api_base: String,
    api_key: SecretString,
}

impl HttpPlacesClient {
    fn new(config: &AppConfig) -> AppResult<Self> {
        let api_key = config
            .google_places_api_key
            .clone()
            .ok_or_else(|| AppError::Config("GOOGLE_PLACES_API_KEY is not set".into()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.places_api_base.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl PlaceDirectory for HttpPlacesClient {
    async fn text_search(
        &self,
        query: &str,
        viewport: Option<&Viewport>,
    ) -> AppResult<Vec<PlaceSummary>> {
        #[derive(Serialize)]
        struct RequestBody<'a> {
            #[serde(rename = "textQuery")]
            text_query: &'a str,
            #[serde(rename = "maxResultCount")]
            max_result_count: u8,
            #[serde(rename = "locationRestriction", skip_serializing_if = "Option::is_none")]
            location_restriction: Option<Restriction>,
        }

        #[derive(Serialize)]
        struct Restriction {
            rectangle: Rectangle,
        }

        #[derive(Serialize)]
        struct Rectangle {
            low: Corner,
            high: Corner,
        }

        #[derive(Serialize)]
        struct Corner {
            latitude: f64,
            longitude: f64,
        }

        #[derive(Deserialize)]
        struct Response {
            places: Option<Vec<ResponsePlace>>,
        }

        #[derive(Deserialize)]
        struct ResponsePlace {
            id: Option<String>,
            #[serde(rename = "displayName")]
            display_name: Option<ResponseText>,
            rating: Option<f64>,
            location: Option<ResponseLocation>,
        }

        let body = RequestBody {
            text_query: query,
            max_result_count: MAX_SEARCH_RESULTS,
            location_restriction: viewport.map(|v| Restriction {
                rectangle: Rectangle {
                    low: Corner {
                        latitude: v.low.lat,
                        longitude: v.low.lng,
                    },
                    high: Corner {
                        latitude: v.high.lat,
                        longitude: v.high.lng,
                    },
                },
            }),
        };

        let response = self
            .http
            .post(format!("{}/places:searchText", self.api_base))
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .header("X-Goog-FieldMask", SEARCH_FIELD_MASK)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response.json().await?;
        let places = parsed
            .places
            .unwrap_or_default()
            .into_iter()
            .filter_map(|place| {
                let location = place.location?;
                Some(PlaceSummary {
                    place_id: place.id?,
                    name: place
                        .display_name
                        .and_then(|text| text.text)
                        .unwrap_or_default(),
                    rating: place.rating,
                    location: LatLng {
                        lat: location.latitude?,
                        lng: location.longitude?,
                    },
                })
            })
            .collect();
        Ok(places)
    }

    async fn place_details(&self, place_id: &str) -> AppResult<PlaceDetails> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(rename = "displayName")]
            display_name: Option<ResponseText>,
            #[serde(rename = "formattedAddress")]
            formatted_address: Option<String>,
            rating: Option<f64>,
            reviews: Option<Vec<ResponseReview>>,
        }

        #[derive(Deserialize)]
        struct ResponseReview {
            text: Option<ResponseText>,
        }

        let response = self
            .http
            .get(format!("{}/places/{place_id}", self.api_base))
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .header("X-Goog-FieldMask", DETAILS_FIELD_MASK)
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response.json().await?;
        Ok(PlaceDetails {
            name: parsed
                .display_name
                .and_then(|text| text.text)
                .unwrap_or_default(),
            formatted_address: parsed.formatted_address,
            rating: parsed.rating,
            reviews: parsed
                .reviews
                .unwrap_or_default()
                .into_iter()
                .filter_map(|review| review.text.and_then(|text| text.text))
                .collect(),
        })
    }
}

#[derive(Deserialize)]
struct ResponseText {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_covers_all_points() {
        let bounds = Viewport::fit([
            LatLng { lat: 35.0, lng: 139.0 },
            LatLng { lat: 36.0, lng: 138.5 },
            LatLng { lat: 35.5, lng: 139.5 },
        ])
        .unwrap();

        assert_eq!(bounds.low, LatLng { lat: 35.0, lng: 138.5 });
        assert_eq!(bounds.high, LatLng { lat: 36.0, lng: 139.5 });
    }

    #[test]
    fn fit_of_nothing_is_none() {
        assert!(Viewport::fit([]).is_none());
    }

    #[test]
    fn around_is_centered() {
        let center = LatLng { lat: 35.7, lng: 139.7 };
        let viewport = Viewport::around(center, 0.2);
        assert!((viewport.center().lat - center.lat).abs() < 1e-9);
        assert!((viewport.center().lng - center.lng).abs() < 1e-9);
        assert!((viewport.high.lat - viewport.low.lat - 0.2).abs() < 1e-9);
    }
}
